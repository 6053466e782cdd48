use log::{info, warn};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};
use crate::interview::{interview_from_rows, Candidate, Interview};
use crate::media::RecordingArtifact;
use crate::proctor::WarningEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Accepted,
    Rejected,
}

/// Result of validating a setup link token.
#[derive(Debug, Clone)]
pub struct SetupValidation {
    pub interview_id: String,
    pub candidate_email: Option<String>,
}

/// One recorded answer plus the proctoring evidence attached to it.
pub struct AnswerUpload<'a> {
    pub interview_id: &'a str,
    pub question_id: &'a str,
    pub candidate_token: &'a str,
    pub artifact: &'a RecordingArtifact,
    pub tab_switch_count: u32,
    pub total_warnings: usize,
    pub question_warnings: &'a [WarningEntry],
    pub user_agent: &'a str,
}

pub struct SetupSubmission {
    pub name: String,
    pub email: String,
    pub interview_id: String,
    pub cam_ok: bool,
    pub mic_ok: bool,
    pub user_agent: String,
    pub resume_file_name: String,
    pub resume: Vec<u8>,
}

/// Backend surface of the interview service. The production implementation
/// is [`ApiClient`]; tests substitute their own.
#[allow(async_fn_in_trait)]
pub trait Gateway: Send + Sync {
    async fn fetch_interview(&self, interview_id: &str) -> AppResult<Interview>;
    async fn consume_token(&self, token: &str) -> AppResult<TokenStatus>;
    async fn validate_setup(&self, token: &str) -> AppResult<SetupValidation>;
    async fn upload_answer(&self, upload: AnswerUpload<'_>) -> AppResult<()>;
    async fn submit_setup(&self, submission: SetupSubmission) -> AppResult<Candidate>;
}

pub struct ApiClient {
    http: reqwest::Client,
    cfg: ApiConfig,
}

impl ApiClient {
    pub fn new(cfg: ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }
}

impl Gateway for ApiClient {
    async fn fetch_interview(&self, interview_id: &str) -> AppResult<Interview> {
        let endpoint = &self.cfg.interviews_endpoint;
        let mut req = self.http.get(endpoint).query(&[("id", interview_id)]);
        if let Some(key) = &self.cfg.interviews_api_key {
            req = req.header("x-api-key", key);
        }

        let res = req
            .send()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;
        if !res.status().is_success() {
            return Err(AppError::validation(
                endpoint,
                format!("API {}", res.status().as_u16()),
            ));
        }
        let body: Value = res
            .json()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;
        interview_from_rows(endpoint, body)
    }

    /// Single-use token check. The response shape has drifted across
    /// backend versions, so every known rejection marker is honored.
    async fn consume_token(&self, token: &str) -> AppResult<TokenStatus> {
        let endpoint = &self.cfg.consume_token_endpoint;
        let res = self
            .http
            .post(endpoint)
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;

        let status = res.status();
        let body: Value = res.json().await.unwrap_or(Value::Null);
        let rejected = !status.is_success()
            || body["ok"] == Value::Bool(false)
            || body["used"] == Value::Bool(true)
            || body["valid"] == Value::Bool(false)
            || body["status"] == "used";

        if rejected {
            warn!("interview token rejected (status {status})");
            Ok(TokenStatus::Rejected)
        } else {
            Ok(TokenStatus::Accepted)
        }
    }

    async fn validate_setup(&self, token: &str) -> AppResult<SetupValidation> {
        let endpoint = &self.cfg.setup_validate_endpoint;
        let res = self
            .http
            .get(endpoint)
            .query(&[("token", token)])
            .send()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;

        // the endpoint sometimes answers with plain text on errors
        let raw = res
            .text()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;
        let body: Value = serde_json::from_str(&raw)
            .unwrap_or_else(|_| json!({ "error": "Invalid response from server" }));

        match body["interviewId"].as_str().filter(|s| !s.is_empty()) {
            Some(interview_id) => Ok(SetupValidation {
                interview_id: interview_id.to_string(),
                candidate_email: body["email"].as_str().map(str::to_string),
            }),
            None => {
                let reason = body["error"]
                    .as_str()
                    .unwrap_or("Setup link is invalid or expired")
                    .to_string();
                Err(AppError::validation(endpoint, reason))
            }
        }
    }

    async fn upload_answer(&self, upload: AnswerUpload<'_>) -> AppResult<()> {
        let endpoint = &self.cfg.upload_webhook;
        let ext = upload.artifact.file_ext();
        let file_name = format!("{}.{}", upload.question_id, ext);
        let file_path = format!("{}/{}", upload.interview_id, file_name);
        let warnings_json = serde_json::to_string(upload.question_warnings)
            .map_err(|e| AppError::network(endpoint, e))?;

        let part = Part::bytes(upload.artifact.data.clone())
            .file_name(file_name)
            .mime_str(&upload.artifact.mime_type)
            .map_err(|e| AppError::network(endpoint, e))?;

        let form = Form::new()
            .text("interview_id", upload.interview_id.to_string())
            .text("question_id", upload.question_id.to_string())
            .text("candidate_token", upload.candidate_token.to_string())
            .text("file_path", file_path)
            .text("mimeType", upload.artifact.mime_type.clone())
            .text("userAgent", upload.user_agent.to_string())
            .text("tab_switch_count", upload.tab_switch_count.to_string())
            .text("total_warnings", upload.total_warnings.to_string())
            .text(
                "question_warning_count",
                upload.question_warnings.len().to_string(),
            )
            .text("warnings_json", warnings_json)
            .part("file", part);

        let res = self
            .http
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;

        if !res.status().is_success() {
            return Err(AppError::UploadFailed {
                status: res.status().as_u16(),
            });
        }
        info!(
            "uploaded answer {} ({} bytes)",
            upload.question_id,
            upload.artifact.len()
        );
        Ok(())
    }

    async fn submit_setup(&self, submission: SetupSubmission) -> AppResult<Candidate> {
        let endpoint = &self.cfg.setup_webhook;
        let resume = Part::bytes(submission.resume)
            .file_name(submission.resume_file_name.clone())
            .mime_str("application/octet-stream")
            .map_err(|e| AppError::network(endpoint, e))?;

        let form = Form::new()
            .text("name", submission.name.clone())
            .text("email", submission.email.clone())
            .text("interview_id", submission.interview_id)
            .text("cam_ok", submission.cam_ok.to_string())
            .text("mic_ok", submission.mic_ok.to_string())
            .text("userAgent", submission.user_agent)
            .part("resume", resume);

        let res = self
            .http
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;
        if !res.status().is_success() {
            return Err(AppError::validation(
                endpoint,
                format!("API {}", res.status().as_u16()),
            ));
        }

        let body: Value = res
            .json()
            .await
            .map_err(|e| AppError::network(endpoint, e))?;
        let candidate_id = ["candidateId", "candidate_id", "id"]
            .iter()
            .find_map(|k| body[*k].as_str().filter(|s| !s.is_empty()))
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::validation(endpoint, "setup response has no candidate id")
            })?;

        Ok(Candidate {
            candidate_id,
            name: submission.name,
            email: submission.email,
        })
    }
}
