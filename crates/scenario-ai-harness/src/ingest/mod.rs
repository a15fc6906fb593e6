//! Turns accumulated model text into a JSON value.
//!
//! Stages run leaf-first: [`accumulator`] folds fragments into one buffer,
//! [`extract`] isolates the outermost object or array, [`repair`] applies
//! syntax heuristics and [`parse`] performs the two-tier parse.
pub mod accumulator;
pub mod extract;
pub mod parse;
pub mod repair;

pub use accumulator::{Accumulator, EmissionMode, accumulate};
pub use extract::{
    BracketMatcher, DepthBracketMatcher, ExtractedCandidate, OuterBracketMatcher, StructureKind,
    extract, extract_with, strip_code_fences,
};
pub use parse::{Recovery, parse_structured, recover};
pub use repair::repair;
