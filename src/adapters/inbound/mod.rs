mod api_server;
pub mod site_middleware;

pub use api_server::{router, ApiServer, ApiState, SiteOptions};

// Re-export for external use (e.g., integration tests)
#[allow(unused_imports)]
pub use api_server::{DetectionResponse, SiteContextResponse};
pub use site_middleware::{bind_country_site, SiteContext};
