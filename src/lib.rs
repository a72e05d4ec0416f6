pub mod batch;
pub mod config;
pub mod humanize;
pub mod ledger;
pub mod observability;
pub mod orchestrator;
pub mod sitemap;
pub mod submit;
