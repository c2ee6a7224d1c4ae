//! Request and Response models for the admin API

pub mod requests;
pub mod responses;

pub use requests::{InvalidatePatternRequest, InvalidateTagsRequest, SetRequest};
pub use responses::{
    DeleteResponse, GetResponse, HealthResponse, InvalidationResponse, SetResponse, StatsResponse,
};
