//! The browser-facing PACS proxy: viewer bootstrap, archive export, DICOMweb
//! and REST pass-through, and the rewritten OHIF viewer.

pub mod dicomweb;
pub mod export;
pub mod forward;
pub mod ohif;
pub mod orthanc_rest;
pub mod rewriter;
pub mod viewer;

use crate::state::AppState;
use axum::routing::{any, get};
use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/viewer", get(viewer::viewer_page))
        .route("/export-dicom", get(export::export_study))
        .route("/dicom-web/{*path}", any(dicomweb::dicomweb_proxy))
        .route("/orthanc/{*path}", any(orthanc_rest::orthanc_proxy))
        .route("/ohif", get(ohif::ohif_index))
        .route("/ohif/", get(ohif::ohif_index))
        .route("/ohif/{*path}", get(ohif::ohif_asset))
}
