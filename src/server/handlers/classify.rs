use std::fmt;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error, info, warn};
use tiny_http::Request;

use crate::error::ClassificationError;
use crate::model::check_scores;
use crate::predict::ClassifyResponse;
use crate::preprocess::{check_content_type, DEFAULT_CONTENT_TYPE};
use crate::server::context::AppContext;
use crate::server::multipart::{extract_boundary, extract_upload, is_multipart_form, UploadedFile};
use crate::server::pool::panic_message;
use crate::server::routes::{detail_response, json_response, HttpResponse};

/// Form field the upload is expected in; any file part is accepted if it
/// is missing.
pub const UPLOAD_FIELD: &str = "file";

/// Where a request is in the classification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Normalized,
    Inferred,
    Extracted,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Normalized => "normalized",
            Stage::Inferred => "inferred",
            Stage::Extracted => "extracted",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// POST /classify
// ---------------------------------------------------------------------------

pub fn handle(request: &mut Request, ctx: &AppContext) -> HttpResponse {
    let content_type = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_owned())
        .unwrap_or_default();

    let outcome = read_body(request, ctx.max_upload_bytes)
        .and_then(|body| contain_panics(|| classify_body(ctx, &content_type, &body)));

    match outcome {
        Ok(response) => json_response(200, &response),
        Err(e) => detail_response(e.status_code(), &e.to_string()),
    }
}

/// Turns a panic on the request thread into an `InternalError`.
fn contain_panics<F>(run: F) -> Result<ClassifyResponse, ClassificationError>
where
    F: FnOnce() -> Result<ClassifyResponse, ClassificationError>,
{
    panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        let msg = panic_message(payload.as_ref());
        error!("classify request panicked: {}", msg);
        Err(ClassificationError::InternalError(format!("unexpected failure: {}", msg)))
    })
}

/// Reads the request body, refusing anything over `limit` bytes.
fn read_body(request: &mut Request, limit: usize) -> Result<Vec<u8>, ClassificationError> {
    if let Some(declared) = request.body_length() {
        if declared > limit {
            warn!("rejecting body of {} bytes (limit {})", declared, limit);
            return Err(ClassificationError::PayloadTooLarge { size: declared, limit });
        }
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| ClassificationError::MissingUpload(format!("could not read request body: {}", e)))?;
    if body.len() > limit {
        warn!("rejecting chunked body over {} bytes", limit);
        return Err(ClassificationError::PayloadTooLarge { size: body.len(), limit });
    }
    Ok(body)
}

/// Pulls the uploaded file out of a multipart body and classifies it.
pub fn classify_body(
    ctx: &AppContext,
    content_type: &str,
    body: &[u8],
) -> Result<ClassifyResponse, ClassificationError> {
    let upload = parse_upload(content_type, body).map_err(|e| {
        warn!("classify failed at {}: {} ({})", Stage::Received, e, e.kind());
        e
    })?;
    classify_upload(ctx, &upload)
}

fn parse_upload(content_type: &str, body: &[u8]) -> Result<UploadedFile, ClassificationError> {
    if !is_multipart_form(content_type) {
        return Err(ClassificationError::MissingUpload(format!(
            "expected a multipart/form-data body, got '{}'",
            content_type
        )));
    }
    let boundary = extract_boundary(content_type)
        .ok_or_else(|| ClassificationError::MissingUpload("multipart boundary is missing".into()))?;
    let upload = extract_upload(body, &boundary, UPLOAD_FIELD)
        .ok_or_else(|| ClassificationError::MissingUpload(format!("form has no '{}' file field", UPLOAD_FIELD)))?;
    if upload.filename.is_empty() && upload.data.is_empty() {
        return Err(ClassificationError::MissingUpload("no file was selected".into()));
    }
    Ok(upload)
}

/// Runs an upload through validation, normalization, inference and
/// extraction, logging the outcome.
pub fn classify_upload(ctx: &AppContext, upload: &UploadedFile) -> Result<ClassifyResponse, ClassificationError> {
    let content_type = upload.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
    info!(
        "received file '{}' ({} bytes, content type {})",
        upload.filename,
        upload.data.len(),
        content_type
    );

    let mut stage = Stage::Received;
    match run_pipeline(ctx, upload, content_type, &mut stage) {
        Ok(response) => {
            stage = Stage::Responded;
            info!(
                "classified '{}' as {} '{}' ({:.2}%) [{}]",
                upload.filename, response.pred_label, response.pred_class, response.pred_conf, stage
            );
            Ok(response)
        }
        Err(e) => {
            if e.status_code() >= 500 {
                error!(
                    "classify failed after {}: file='{}' content_type={} kind={}: {}",
                    stage, upload.filename, content_type, e.kind(), e
                );
            } else {
                warn!(
                    "classify failed after {}: file='{}' content_type={} kind={}: {}",
                    stage, upload.filename, content_type, e.kind(), e
                );
            }
            Err(e)
        }
    }
}

fn run_pipeline(
    ctx: &AppContext,
    upload: &UploadedFile,
    content_type: &str,
    stage: &mut Stage,
) -> Result<ClassifyResponse, ClassificationError> {
    check_content_type(content_type)?;
    *stage = Stage::Validated;

    let image = ctx.normalizer.decode(&upload.data)?;
    *stage = Stage::Normalized;

    debug!("submitting {}x{} image for inference", image.width(), image.height());
    let scores = ctx.pool.infer(image)?;
    check_scores(&scores, ctx.num_classes)?;
    *stage = Stage::Inferred;

    let result = ctx.extractor.extract(&scores, &ctx.labels)?;
    *stage = Stage::Extracted;

    Ok(ClassifyResponse::from(&result))
}
