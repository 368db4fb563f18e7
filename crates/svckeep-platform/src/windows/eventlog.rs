//! Event log writer and message box presenter.

use std::io;

use windows::Win32::Foundation::{HWND, PSID};
use windows::Win32::System::EventLog::{
    DeregisterEventSource, REPORT_EVENT_TYPE, RegisterEventSourceW, ReportEventW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    MB_ICONASTERISK, MB_ICONEXCLAMATION, MB_ICONSTOP, MB_OK, MessageBoxW,
};
use windows::core::PCWSTR;

use svckeep_core::{EventLogWriter, Icon, PopupPresenter, Severity};

use super::{wide, win_io};

/// Event id reported for every entry; the text travels as the single
/// insertion string.
pub const EVENT_ID: u32 = 0x64;

/// Writes entries to the Application event log.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLog;

impl EventLogWriter for EventLog {
    fn write(&self, source: &str, severity: Severity, text: &str) -> io::Result<()> {
        let source = wide(source);
        let text = wide(text);
        let handle = unsafe { RegisterEventSourceW(PCWSTR::null(), PCWSTR(source.as_ptr())) }
            .map_err(|e| win_io(&e))?;

        let strings = [PCWSTR(text.as_ptr())];
        let reported = unsafe {
            ReportEventW(
                handle,
                REPORT_EVENT_TYPE(severity.event_type()),
                0,
                EVENT_ID,
                PSID::default(),
                0,
                Some(&strings),
                None,
            )
        }
        .ok()
        .map_err(|e| win_io(&e));
        let _ = unsafe { DeregisterEventSource(handle) };
        reported
    }
}

/// Shows diagnostics in a modal message box.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageBox;

impl PopupPresenter for MessageBox {
    fn show(&self, title: &str, text: &str, icon: Icon) {
        let style = MB_OK
            | match icon {
                Icon::Asterisk => MB_ICONASTERISK,
                Icon::Exclamation => MB_ICONEXCLAMATION,
                Icon::Stop => MB_ICONSTOP,
            };
        let title = wide(title);
        let text = wide(text);
        unsafe {
            MessageBoxW(
                HWND::default(),
                PCWSTR(text.as_ptr()),
                PCWSTR(title.as_ptr()),
                style,
            );
        }
    }
}
