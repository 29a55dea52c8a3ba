pub mod app_state_ops;
pub mod command_queue_ops;
pub mod conflict_ops;
pub mod device_meta_ops;
pub mod operation_log_ops;
pub mod protection_flag_ops;
pub mod tracked_change_ops;
