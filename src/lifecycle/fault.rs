//! Uncaught fault handler
//!
//! A panic anywhere in the process (including inside a request handler task)
//! leaves the service in an unknown state. The hook logs the fault, marks the
//! coordinator stopped and exits non-zero; the orchestrator restarts us.

use crate::lifecycle::coordinator::{ExitOutcome, LifecycleCoordinator};
use std::any::Any;
use std::panic::PanicHookInfo;
use tracing::error;

/// Install the process-wide panic hook
pub fn install_fault_handler(coordinator: LifecycleCoordinator) {
    std::panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        let message = payload_message(info.payload());
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "<unknown>".to_string());
        let thread = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();
        let backtrace = std::backtrace::Backtrace::force_capture();

        error!(
            panic = %message,
            location = %location,
            thread = %thread,
            backtrace = %backtrace,
            "Uncaught fault, terminating process"
        );

        coordinator.on_fault(&message);
        std::process::exit(ExitOutcome::Fault.exit_code());
    }));
}

/// Render a panic payload as text
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
