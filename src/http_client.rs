use crate::services::wifi::{Rejection, WorkflowOutcome, WorkflowReport};
use actix_web::HttpResponse;
use anyhow::{Context, Result, ensure};
use reqwest::{Client, Response};
use std::time::Duration;

/// Create the HTTP client used to talk to the device
///
/// # Arguments
/// * `request_timeout` - Upper bound for a single request/response exchange
///
/// # Examples
/// ```no_run
/// use openlogger_wifi::http_client::device_client;
/// use std::time::Duration;
///
/// let client = device_client(Duration::from_secs(10))
///     .expect("failed to create client");
/// ```
pub fn device_client(request_timeout: Duration) -> Result<Client> {
    ensure!(
        !request_timeout.is_zero(),
        "failed since request timeout must not be zero"
    );

    Client::builder()
        .timeout(request_timeout)
        .build()
        .context("failed to create device HTTP client")
}

/// Trait for converting service results into HTTP responses
pub trait ServiceResultResponse {
    fn into_response(self) -> HttpResponse;
}

impl ServiceResultResponse for WorkflowReport {
    fn into_response(self) -> HttpResponse {
        let mut response = match &self.outcome {
            WorkflowOutcome::Completed => HttpResponse::Ok(),
            WorkflowOutcome::Cancelled => HttpResponse::Conflict(),
            WorkflowOutcome::Rejected(Rejection::Busy) => HttpResponse::Conflict(),
            WorkflowOutcome::Rejected(Rejection::ConfirmationRequired) => {
                HttpResponse::PreconditionRequired()
            }
            WorkflowOutcome::Rejected(Rejection::NoSuchSavedNetwork) => HttpResponse::NotFound(),
            WorkflowOutcome::Rejected(_) => HttpResponse::BadRequest(),
            WorkflowOutcome::Failed(_) => HttpResponse::BadGateway(),
        };

        response.json(&self)
    }
}

/// Handle HTTP response by checking status and extracting body
///
/// This is a common utility for processing HTTP responses.
/// It ensures the response status is successful and extracts the body text.
///
/// # Arguments
/// * `res` - The HTTP response to handle
/// * `context_msg` - Context message describing the request (e.g., "nicList command")
///
/// # Returns
/// * `Ok(String)` - The response body if the status is successful
/// * `Err` - If the status is not successful or reading the body fails
pub async fn handle_http_response(res: Response, context_msg: &str) -> Result<String> {
    let status = res.status();
    let body = res.text().await.context("failed to read response body")?;

    ensure!(
        status.is_success(),
        "{context_msg} failed with status {status} and body: {body}"
    );

    Ok(body)
}
