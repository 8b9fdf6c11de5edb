use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Json;
use chrono::{DateTime, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::{AppState, QrRemoval};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, QrCode, QrType};
use crate::qr::{build_tip_url, render_png, render_svg};
use crate::request_state::RequestState;

use super::dto::{QrStatusDto, QrTypeDto};
use super::{require_min_chars, JsonBody, QueryParams, Validate};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/venue/:id/qr",
            get_with(list_qr_codes, list_qr_codes_docs)
                .post_with(create_qr_code, create_qr_code_docs),
        )
        .api_route(
            "/qr/:id",
            get_with(get_qr_code, get_qr_code_docs)
                .put_with(update_qr_code, update_qr_code_docs)
                .delete_with(delete_qr_code, delete_qr_code_docs),
        )
        .route("/qr/:id/download", get(download_qr_code))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct QrCodeDto {
    pub id: u64,
    pub venue_id: u64,
    pub short_code: String,
    pub qr_type: QrTypeDto,
    pub label: String,
    pub status: QrStatusDto,
    pub staff_id: Option<u64>,
    pub tip_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<&models::QrCode> for QrCodeDto {
    fn from(value: &models::QrCode) -> Self {
        Self {
            id: value.id,
            venue_id: value.venue_id,
            short_code: value.short_code.clone(),
            qr_type: (&value.qr_type).into(),
            label: value.label.clone(),
            status: (&value.status).into(),
            staff_id: value.staff_id,
            tip_url: build_tip_url(&value.short_code),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct QrCodeSummaryDto {
    #[serde(flatten)]
    pub qr_code: QrCodeDto,
    pub staff_name: Option<String>,
    pub tip_count: i64,
}

impl From<&models::QrCodeSummary> for QrCodeSummaryDto {
    fn from(value: &models::QrCodeSummary) -> Self {
        Self {
            qr_code: QrCodeDto::from(&value.qr_code),
            staff_name: value.staff.as_ref().map(|s| s.display_name.clone()),
            tip_count: value.tip_count,
        }
    }
}

/// Load a qr code and check that the caller may manage its venue.
async fn qr_code_require(state: &mut RequestState, id: u64) -> ServiceResult<QrCode> {
    state.session_require()?;

    let qr_code = state
        .db
        .get_qr_code_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound("QR code not found"))?;
    state.venue_require(qr_code.venue_id).await?;

    Ok(qr_code)
}

async fn list_qr_codes(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
) -> ServiceResult<Json<Vec<QrCodeSummaryDto>>> {
    let venue = state.venue_require(venue_id).await?;

    let qr_codes = state.db.get_qr_code_summaries(venue.id).await?;
    Ok(Json(qr_codes.iter().map(|q| q.into()).collect()))
}

fn list_qr_codes_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the qr codes of a venue.")
        .tag("qr_codes")
        .response::<200, Json<Vec<QrCodeSummaryDto>>>()
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateQrCodeDto {
    pub qr_type: QrTypeDto,
    pub label: String,
}

impl Validate for CreateQrCodeDto {
    fn validate(&self) -> ServiceResult<()> {
        if self.qr_type == QrTypeDto::Personal {
            return Err(ServiceError::validation("QR type must be TABLE or VENUE"));
        }
        require_min_chars(&self.label, 1, "Label is required")
    }
}

async fn create_qr_code(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
    form: JsonBody<CreateQrCodeDto>,
) -> ServiceResult<Json<QrCodeDto>> {
    let venue = state.venue_require(venue_id).await?;
    let form = form.0;

    let qr_code = state
        .db
        .create_qr_code(&venue, form.qr_type.into(), form.label.trim())
        .await?;
    info!("Created qr code {} for venue {}", qr_code.short_code, venue.id);

    Ok(Json(QrCodeDto::from(&qr_code)))
}

fn create_qr_code_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a table or venue qr code. Requires a connected payment gateway.")
        .tag("qr_codes")
        .response::<200, Json<QrCodeDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid input or the payment gateway is not connected!")
        })
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

async fn get_qr_code(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<QrCodeDto>> {
    let qr_code = qr_code_require(&mut state, id).await?;
    Ok(Json(QrCodeDto::from(&qr_code)))
}

fn get_qr_code_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a qr code with its tip url.")
        .tag("qr_codes")
        .response::<200, Json<QrCodeDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested qr code does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateQrCodeDto {
    pub label: Option<String>,
    pub status: Option<QrStatusDto>,
}

impl Validate for UpdateQrCodeDto {
    fn validate(&self) -> ServiceResult<()> {
        if let Some(label) = &self.label {
            require_min_chars(label, 1, "Label is required")?;
        }
        Ok(())
    }
}

async fn update_qr_code(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<UpdateQrCodeDto>,
) -> ServiceResult<Json<QrCodeDto>> {
    let mut qr_code = qr_code_require(&mut state, id).await?;
    let form = form.0;

    if let Some(label) = form.label {
        qr_code.label = label.trim().to_owned();
    }
    if let Some(status) = form.status {
        qr_code.status = status.into();
    }

    let qr_code = state.db.store_qr_code(qr_code).await?;
    Ok(Json(QrCodeDto::from(&qr_code)))
}

fn update_qr_code_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update label and status of a qr code.")
        .tag("qr_codes")
        .response::<200, Json<QrCodeDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested qr code does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DeletedQrCodeDto {
    pub message: String,
    pub soft_deleted: bool,
}

impl From<QrRemoval> for DeletedQrCodeDto {
    fn from(value: QrRemoval) -> Self {
        match value {
            QrRemoval::Deleted => Self {
                message: "QR code deleted successfully".to_owned(),
                soft_deleted: false,
            },
            QrRemoval::Deactivated => Self {
                message: "QR code deactivated (has tip history)".to_owned(),
                soft_deleted: true,
            },
        }
    }
}

async fn delete_qr_code(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<DeletedQrCodeDto>> {
    let qr_code = qr_code_require(&mut state, id).await?;

    let removal = state.db.remove_qr_code(&qr_code).await?;
    info!("Removed qr code {}: {:?}", qr_code.short_code, removal);

    Ok(Json(removal.into()))
}

fn delete_qr_code_docs(op: TransformOperation) -> TransformOperation {
    op.description("Delete a qr code. Codes with tips are only deactivated.")
        .tag("qr_codes")
        .response::<200, Json<DeletedQrCodeDto>>()
        .response_with::<400, (), _>(|res| res.description("Personal qr codes cannot be deleted!"))
        .response_with::<404, (), _>(|res| res.description("The requested qr code does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Clone, Copy, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatDto {
    #[default]
    Png,
    Svg,
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DownloadQueryDto {
    #[serde(default)]
    pub format: ImageFormatDto,
}

impl Validate for DownloadQueryDto {}

fn attachment_name(qr_code: &QrCode, extension: &str) -> String {
    let kind = match qr_code.qr_type {
        QrType::Personal => "staff",
        QrType::Table => "table",
        QrType::Venue => "venue",
    };
    format!("qr-{}-{}.{}", kind, qr_code.short_code, extension)
}

pub async fn download_qr_code(
    mut state: RequestState,
    Path(id): Path<u64>,
    query: QueryParams<DownloadQueryDto>,
) -> ServiceResult<Response> {
    let qr_code = qr_code_require(&mut state, id).await?;
    let tip_url = build_tip_url(&qr_code.short_code);

    let (content_type, extension, data) = match query.0.format {
        ImageFormatDto::Png => ("image/png", "png", render_png(&tip_url)?),
        ImageFormatDto::Svg => ("image/svg+xml", "svg", render_svg(&tip_url)?.into_bytes()),
    };

    let mut header = HeaderMap::new();
    header.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(disposition) = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        attachment_name(&qr_code, extension)
    )) {
        header.insert(header::CONTENT_DISPOSITION, disposition);
    }

    Ok((StatusCode::OK, header, data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_qr_code_validation() {
        let form = CreateQrCodeDto {
            qr_type: QrTypeDto::Table,
            label: "Table 4".to_owned(),
        };
        assert!(form.validate().is_ok());

        let form = CreateQrCodeDto {
            qr_type: QrTypeDto::Table,
            label: "  ".to_owned(),
        };
        assert_eq!(
            form.validate(),
            Err(ServiceError::validation("Label is required"))
        );

        let form = CreateQrCodeDto {
            qr_type: QrTypeDto::Personal,
            label: "Made".to_owned(),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_delete_response() {
        let dto = DeletedQrCodeDto::from(QrRemoval::Deactivated);
        assert!(dto.soft_deleted);

        let dto = DeletedQrCodeDto::from(QrRemoval::Deleted);
        assert!(!dto.soft_deleted);
        assert_eq!(dto.message, "QR code deleted successfully");
    }
}
