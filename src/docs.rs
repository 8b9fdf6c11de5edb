use std::sync::Arc;

use aide::{
    axum::{
        routing::{get, get_with},
        ApiRouter, IntoApiResponse,
    },
    openapi::{OpenApi, Tag},
    redoc::Redoc,
    transform::TransformOpenApi,
};
use axum::{response::IntoResponse, Extension, Json};

fn tag(name: &str, description: &str) -> Tag {
    Tag {
        name: name.into(),
        description: Some(description.into()),
        ..Default::default()
    }
}

pub fn api_docs(api: TransformOpenApi) -> TransformOpenApi {
    api.title("tipping-server")
        .summary("Cashless tipping for venues and their staff")
        .description(
            "Guests scan a qr code, pick an amount and pay through the venue's own Midtrans \
             merchant account. Managers run staff, qr codes and payouts, admins oversee the \
             platform.",
        )
        .tag(tag("auth", "Registration and login"))
        .tag(tag("venues", "Venue profile, settings and gateway connection"))
        .tag(tag("staff", "Staff members and their personal qr codes"))
        .tag(tag("qr_codes", "Table and venue qr codes"))
        .tag(tag("tips", "Public tip intake and status polling"))
        .tag(tag("webhooks", "Payment gateway notifications"))
        .tag(tag("payouts", "Payout reports and venue dashboard"))
        .tag(tag("admin", "Platform administration"))
        .tag(tag("health", "Service health"))
        .security_scheme(
            "SessionToken",
            aide::openapi::SecurityScheme::Http {
                scheme: "bearer".into(),
                bearer_format: None,
                description: Some(
                    "Session token of `/auth/password` or `/auth/otp/verify`, also accepted as \
                     `session` cookie."
                        .into(),
                ),
                extensions: Default::default(),
            },
        )
}

pub fn docs_routes() -> ApiRouter {
    // The redoc route has its content type inferred.
    aide::gen::infer_responses(true);

    let router = ApiRouter::new()
        .api_route(
            "/",
            get_with(
                Redoc::new("/docs/api.json")
                    .with_title("tipping-server")
                    .axum_handler(),
                |op| op.description("This documentation page."),
            ),
        )
        .route("/api.json", get(serve_docs));

    aide::gen::infer_responses(false);

    router
}

async fn serve_docs(Extension(api): Extension<Arc<OpenApi>>) -> impl IntoApiResponse {
    Json(api).into_response()
}
