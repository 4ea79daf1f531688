use crate::routes::health;
use crate::routes::v1;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(info(
    title = "mediadrop-server",
    description = "Submit a media URL, poll the task, download the result",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(v1::api_docs());
    root
}
