pub mod expression_validator;
pub mod parser;
pub mod vector;

pub use parser::{parse_query, PromQLSyntaxError};
pub use vector::{InstantVector, LabelMatcher, MatchOperator, Matching, Vector, VectorMatch};
