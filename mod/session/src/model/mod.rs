mod claims;
mod onboarding;
mod route;

pub use claims::*;
pub use onboarding::*;
pub use route::*;
