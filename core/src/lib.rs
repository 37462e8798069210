pub mod fit;
pub mod geometry;
pub mod recognize;
pub mod solver;

pub fn version() -> &'static str {
    "0.1.0"
}
