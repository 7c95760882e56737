use crate::{
    domain::{FileInfo, FileUpload},
    errors::Error,
    ports::ChatApi,
    retry::{RetryPolicy, Sleeper},
    Result,
};

/// Upload timeouts are the only retryable upload failure.
fn is_upload_timeout(err: &Error) -> bool {
    err.is_http_status(408) || err.to_string().contains("408 Request Timeout")
}

/// Upload `upload` to the aggregation workspace, retrying HTTP 408 only.
pub async fn upload_file_with_retry(
    api: &dyn ChatApi,
    upload: &FileUpload,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<FileInfo> {
    for attempt in 1..=policy.max_attempts {
        match api.upload_file(upload).await {
            Ok(file) => return Ok(file),
            Err(e) if is_upload_timeout(&e) => {
                tracing::info!(attempt, file = %upload.filename, "upload hit 408 timeout, retrying");
                if attempt < policy.max_attempts {
                    sleeper.sleep(policy.delay).await;
                }
            }
            Err(e) => return Err(e.context("failed to upload file")),
        }
    }

    Err(Error::External(format!(
        "failed to upload file {} times",
        policy.max_attempts
    )))
}
