//! readscope-report: renders assessment reports and keeps the export ledger.

pub mod html;
pub mod ledger;

pub use html::{render_html, write_html_report};
pub use ledger::JsonlLedger;
