//! OpenAPI support
//!
//! - `SpecDocument` - The parsed subset of an OpenAPI 3.x document
//! - `SpecSource` / `HttpSpecFetcher` - Where documents come from
//! - `Fingerprint` - Change detection between fetches

mod document;
mod fetcher;

pub use document::{
    HttpMethod, MediaType, Operation, ParamLocation, Parameter, RequestBody, SpecDocument,
};
pub use fetcher::{FetchedSpec, Fingerprint, HttpSpecFetcher, SpecSource};
