//! Processing nodes
//!
//! Nodes that reshape or select records without touching external systems.

mod data_filter;
pub mod expression;
mod field_mapper;
pub mod json_path;

pub use data_filter::{
    DataFilterConfig, DataFilterInput, DataFilterNode, DataFilterOutput, FilterCondition, FilterLogic,
    FilterOperator,
};
pub use expression::{CompiledExpression, ExpressionEngine};
pub use field_mapper::{FieldMapperConfig, FieldMapperNode, FieldMapping, OnError, Transformation};
