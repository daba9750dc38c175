mod fixture_rootstrap;

#[allow(unused_imports)]
pub use fixture_rootstrap::*;
