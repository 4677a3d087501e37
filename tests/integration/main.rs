//! End-to-end tests across the façade, reconciler, provisioner, and HTTP API.

mod helpers;
mod http_test;
mod lifecycle_test;
