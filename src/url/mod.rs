//! URL handling: resolving discovered links and normalizing item URLs

mod normalize;
mod resolve;

pub use normalize::normalize_url;
pub use resolve::resolve_link;
