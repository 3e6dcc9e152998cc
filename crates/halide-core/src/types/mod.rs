mod jwks;
mod node;
mod oauth;
mod register;

pub use jwks::*;
pub use node::*;
pub use oauth::*;
pub use register::*;
