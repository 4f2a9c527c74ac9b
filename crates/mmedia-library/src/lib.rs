//! Service side of mmedia: loads the remote catalog, indexes it into a browse
//! tree and answers child queries once the catalog is ready.

pub mod browse_tree;
pub mod catalog;
pub mod fetch;
pub mod readiness;
pub mod service;
