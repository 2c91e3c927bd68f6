use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(description = "Notebox API Documentation", license(name = "MIT or Apache2", identifier="MIT Apache2.0"), title = "Notebox", version = env!("CARGO_PKG_VERSION")),
    paths(
        crate::notes::create_note,
        crate::notes::list_notes,
        crate::notes::get_note,
        crate::notes::delete_note,
        crate::files::serve_file,
        crate::health::health
    )
)]
pub struct ApiDoc;

pub(crate) fn api_route<T: Clone + Sync + Send + 'static>() -> Router<T> {
    let doc = ApiDoc::openapi();
    Router::new().merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", doc))
}
