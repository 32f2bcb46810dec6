// handlers/mod.rs - HTTP handlers
//
// resource: generic CRUD router, one instance per catalog entry (token required)
// users:    users table routes plus signup/signin (public) and token/role lookups
pub mod resource;
pub mod users;
