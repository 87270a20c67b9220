use actix_web::{HttpResponse, Responder, get};

#[utoipa::path(
    summary = "Health check",
    description = "Returns 200 OK when the API is able to serve requests.",
    responses(
        (status = 200, description = "API is healthy")
    ),
    tag = "Health"
)]
#[get("/health_check")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().finish()
}
