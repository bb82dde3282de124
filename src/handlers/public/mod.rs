// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route prefix: none (/, /health, /auth/*, /share/*). Every input here comes from
// an anonymous caller and is validated before it reaches a service.

pub mod auth;
pub mod share;
pub mod system;
