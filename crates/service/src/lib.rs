pub mod service;

pub use service::{
    cancel_scan, get_scan_session, latest_parse, load_report, poll_scan_events, start_scan,
    submit_parse, CancelScanResponse, ParseSnapshot, ScanRequest, ScanSessionSnapshot,
    ScanSessionStatus,
};
