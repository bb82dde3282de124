// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Route prefix: /api/*. Middleware: JWT validation, then the user is re-read from
// the database and handed to handlers as `ValidatedUser`. Each handler turns it
// into an `Actor` and lets the service decide what that role may do.

pub mod assignments;
pub mod auth;
pub mod dashboard;
pub mod demos;
pub mod feedback;
pub mod leads;
pub mod media;
pub mod products;
pub mod share_links;
pub mod storage;
pub mod users;
