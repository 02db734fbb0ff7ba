// Authentication: JWT token pairs, bcrypt passwords, bearer middleware

pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

pub use errors::AuthError;
pub use jwt::{extract_bearer_token, JwtService};
pub use middleware::{coach_only_middleware, jwt_auth_middleware, super_admin_only_middleware};
pub use models::*;
pub use service::AuthService;
