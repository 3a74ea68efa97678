pub mod activity_logger;
pub mod aggregation_service;
pub mod connectivity;
pub mod countdown;
pub mod grading_service;
pub mod proctoring_service;
pub mod ranking_service;
pub mod record_store;
pub mod session_service;
pub mod storage;
pub mod sync_service;
pub mod transport;
