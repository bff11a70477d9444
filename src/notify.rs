//! Native desktop notification service
//!
//! [`NotificationService`] is the seam between the bridge and whatever
//! renders notifications. [`DesktopService`] drives notify-rust, which talks
//! to the freedesktop.org notification daemon on Linux and BSD and to the
//! native APIs on macOS and Windows.

use crate::errors::{BridgeError, Result};
use notify_rust::{Notification, Timeout};
use std::ffi::CStr;

/// Setter-level interface to a notification backend
///
/// A handle is created once per call, mutated by the setters and handed
/// back through `release` exactly once.
pub trait NotificationService {
    type Handle;

    /// Reach the notification server as `app_name`. Failure is fatal to
    /// initialization.
    fn connect(app_name: &str) -> Result<Self>
    where
        Self: Sized;

    fn create(&self, summary: &CStr, body: &CStr, icon: &CStr) -> Self::Handle;
    fn set_category(&self, notification: &mut Self::Handle, category: &CStr);
    fn set_urgency(&self, notification: &mut Self::Handle, urgency: i32);
    fn set_timeout(&self, notification: &mut Self::Handle, timeout: i32);
    fn set_hint_int32(&self, notification: &mut Self::Handle, key: &str, value: i32);
    fn set_hint_double(&self, notification: &mut Self::Handle, key: &str, value: f64);
    fn set_hint_byte(&self, notification: &mut Self::Handle, key: &str, value: u8);
    fn set_hint_string(&self, notification: &mut Self::Handle, key: &str, value: &CStr);

    /// Ask the server to display the notification. Does not wait for it
    /// to be rendered, dismissed or acted upon.
    fn show(&self, notification: &mut Self::Handle) -> Result<()>;

    fn release(&self, notification: Self::Handle);

    /// Process-wide teardown, run once when the session ends
    fn shutdown(&self) {}
}

/// Owns a handle and releases it exactly once when dropped
pub struct NotificationGuard<'s, S: NotificationService> {
    service: &'s S,
    handle: Option<S::Handle>,
}

impl<'s, S: NotificationService> NotificationGuard<'s, S> {
    pub fn new(service: &'s S, handle: S::Handle) -> Self {
        Self {
            service,
            handle: Some(handle),
        }
    }

    /// Mutable access to the live handle
    pub fn handle_mut(&mut self) -> &mut S::Handle {
        // Only `drop` takes the handle out
        self.handle
            .as_mut()
            .unwrap_or_else(|| unreachable!("notification already released"))
    }
}

impl<S: NotificationService> Drop for NotificationGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.service.release(handle);
        }
    }
}

/// notify-rust backed service
#[derive(Debug, Clone)]
pub struct DesktopService {
    app_name: String,
}

impl NotificationService for DesktopService {
    type Handle = Notification;

    /// On freedesktop platforms this round-trips to the daemon so an
    /// unreachable server fails initialization instead of the first call.
    fn connect(app_name: &str) -> Result<Self> {
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            let info = notify_rust::get_server_information()
                .map_err(|e| BridgeError::ServiceUnavailable(e.to_string()))?;
            tracing::info!(
                server = %info.name,
                vendor = %info.vendor,
                version = %info.version,
                "Connected to notification server"
            );
        }

        Ok(Self {
            app_name: app_name.to_string(),
        })
    }

    fn create(&self, summary: &CStr, body: &CStr, icon: &CStr) -> Notification {
        let mut notification = Notification::new();
        notification
            .appname(&self.app_name)
            .summary(&summary.to_string_lossy())
            .body(&body.to_string_lossy())
            .icon(&icon.to_string_lossy());
        notification
    }

    fn set_category(&self, notification: &mut Notification, category: &CStr) {
        push_hint(
            notification,
            RawHint::Category(category.to_string_lossy().into_owned()),
        );
    }

    fn set_urgency(&self, notification: &mut Notification, urgency: i32) {
        push_hint(notification, RawHint::Urgency(urgency));
    }

    fn set_timeout(&self, notification: &mut Notification, timeout: i32) {
        // -1 server default, 0 never expire, otherwise milliseconds
        notification.timeout(Timeout::from(timeout));
    }

    fn set_hint_int32(&self, notification: &mut Notification, key: &str, value: i32) {
        push_hint(notification, RawHint::Int(key.to_string(), value));
    }

    fn set_hint_double(&self, notification: &mut Notification, key: &str, value: f64) {
        // notify-rust has no double-typed hint; the daemon receives the decimal text
        push_hint(notification, RawHint::Text(key.to_string(), value.to_string()));
    }

    fn set_hint_byte(&self, notification: &mut Notification, key: &str, value: u8) {
        push_hint(notification, RawHint::Byte(key.to_string(), value));
    }

    fn set_hint_string(&self, notification: &mut Notification, key: &str, value: &CStr) {
        push_hint(
            notification,
            RawHint::Text(key.to_string(), value.to_string_lossy().into_owned()),
        );
    }

    fn show(&self, notification: &mut Notification) -> Result<()> {
        notification
            .show()
            .map(drop)
            .map_err(|e| BridgeError::Display(e.to_string()))
    }

    fn release(&self, notification: Notification) {
        drop(notification);
    }

    fn shutdown(&self) {
        tracing::debug!(app_name = %self.app_name, "Notification service released");
    }
}

/// Hint kinds the desktop backend can forward
enum RawHint {
    Category(String),
    Urgency(i32),
    Int(String, i32),
    Byte(String, u8),
    Text(String, String),
}

#[cfg(all(unix, not(target_os = "macos")))]
fn push_hint(notification: &mut Notification, hint: RawHint) {
    use notify_rust::Hint;

    let hint = match hint {
        RawHint::Category(category) => Hint::Category(category),
        RawHint::Urgency(level) => urgency_hint(level),
        RawHint::Int(key, value) if key == "urgency" => urgency_hint(value),
        RawHint::Int(key, value) => Hint::CustomInt(key, value),
        RawHint::Byte(key, value) => byte_hint(key, value),
        RawHint::Text(key, value) => Hint::Custom(key, value),
    };

    // One urgency per notification; the last one set wins
    if matches!(hint, Hint::Urgency(_)) {
        notification.hints.retain(|h| !matches!(h, Hint::Urgency(_)));
    }
    notification.hint(hint);
}

/// Typed urgency for the three defined levels
#[cfg(all(unix, not(target_os = "macos")))]
fn urgency_hint(level: i32) -> notify_rust::Hint {
    use notify_rust::{Hint, Urgency};

    match level {
        0 => Hint::Urgency(Urgency::Low),
        1 => Hint::Urgency(Urgency::Normal),
        2 => Hint::Urgency(Urgency::Critical),
        // Out-of-range levels go to the daemon untouched
        level => Hint::CustomInt("urgency".to_string(), level),
    }
}

/// Byte hints with a freedesktop-defined type map onto notify-rust's typed
/// variants; notify-rust has no raw byte hint, so the rest go out as int32.
#[cfg(all(unix, not(target_os = "macos")))]
fn byte_hint(key: String, value: u8) -> notify_rust::Hint {
    use notify_rust::Hint;

    match key.as_str() {
        "urgency" => urgency_hint(i32::from(value)),
        "transient" => Hint::Transient(value != 0),
        "resident" => Hint::Resident(value != 0),
        "action-icons" => Hint::ActionIcons(value != 0),
        "suppress-sound" => Hint::SuppressSound(value != 0),
        _ => Hint::CustomInt(key, i32::from(value)),
    }
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
fn push_hint(_notification: &mut Notification, hint: RawHint) {
    let kind = match hint {
        RawHint::Category(_) => "category",
        RawHint::Urgency(_) => "urgency",
        RawHint::Int(..) | RawHint::Byte(..) | RawHint::Text(..) => "custom",
    };
    tracing::trace!(kind, "Hints are not supported on this platform, skipping");
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// One observed service call
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Create {
            summary: String,
            body: String,
            icon: String,
        },
        Category(String),
        Urgency(i32),
        Timeout(i32),
        HintInt32(String, i32),
        HintDouble(String, f64),
        HintByte(String, u8),
        HintString(String, String),
        Show,
        Release,
        Shutdown,
    }

    impl Call {
        pub fn is_hint(&self) -> bool {
            matches!(
                self,
                Self::HintInt32(..) | Self::HintDouble(..) | Self::HintByte(..) | Self::HintString(..)
            )
        }
    }

    /// Service that records every call. Clones share the same log.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingService {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_show: bool,
    }

    impl RecordingService {
        pub fn failing_show() -> Self {
            Self {
                fail_show: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, call: &Call) -> usize {
            self.calls().iter().filter(|c| *c == call).count()
        }

        pub fn hint_calls(&self) -> Vec<Call> {
            self.calls().into_iter().filter(Call::is_hint).collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    fn text(s: &CStr) -> String {
        s.to_string_lossy().into_owned()
    }

    /// Handle with no state; everything lives in the call log
    #[derive(Debug)]
    pub struct Recorded;

    impl NotificationService for RecordingService {
        type Handle = Recorded;

        fn connect(_app_name: &str) -> Result<Self> {
            Ok(Self::default())
        }

        fn create(&self, summary: &CStr, body: &CStr, icon: &CStr) -> Recorded {
            self.record(Call::Create {
                summary: text(summary),
                body: text(body),
                icon: text(icon),
            });
            Recorded
        }

        fn set_category(&self, _: &mut Recorded, category: &CStr) {
            self.record(Call::Category(text(category)));
        }

        fn set_urgency(&self, _: &mut Recorded, urgency: i32) {
            self.record(Call::Urgency(urgency));
        }

        fn set_timeout(&self, _: &mut Recorded, timeout: i32) {
            self.record(Call::Timeout(timeout));
        }

        fn set_hint_int32(&self, _: &mut Recorded, key: &str, value: i32) {
            self.record(Call::HintInt32(key.to_string(), value));
        }

        fn set_hint_double(&self, _: &mut Recorded, key: &str, value: f64) {
            self.record(Call::HintDouble(key.to_string(), value));
        }

        fn set_hint_byte(&self, _: &mut Recorded, key: &str, value: u8) {
            self.record(Call::HintByte(key.to_string(), value));
        }

        fn set_hint_string(&self, _: &mut Recorded, key: &str, value: &CStr) {
            self.record(Call::HintString(key.to_string(), text(value)));
        }

        fn show(&self, _: &mut Recorded) -> Result<()> {
            self.record(Call::Show);
            if self.fail_show {
                return Err(BridgeError::Display("daemon went away".to_string()));
            }
            Ok(())
        }

        fn release(&self, _: Recorded) {
            self.record(Call::Release);
        }

        fn shutdown(&self) {
            self.record(Call::Shutdown);
        }
    }

    /// Service whose server can never be reached
    #[derive(Debug)]
    pub struct OfflineService;

    impl NotificationService for OfflineService {
        type Handle = ();

        fn connect(_app_name: &str) -> Result<Self> {
            Err(BridgeError::ServiceUnavailable(
                "org.freedesktop.Notifications was not provided by any .service files".to_string(),
            ))
        }

        fn create(&self, _: &CStr, _: &CStr, _: &CStr) {}
        fn set_category(&self, _: &mut (), _: &CStr) {}
        fn set_urgency(&self, _: &mut (), _: i32) {}
        fn set_timeout(&self, _: &mut (), _: i32) {}
        fn set_hint_int32(&self, _: &mut (), _: &str, _: i32) {}
        fn set_hint_double(&self, _: &mut (), _: &str, _: f64) {}
        fn set_hint_byte(&self, _: &mut (), _: &str, _: u8) {}
        fn set_hint_string(&self, _: &mut (), _: &str, _: &CStr) {}

        fn show(&self, _: &mut ()) -> Result<()> {
            Ok(())
        }

        fn release(&self, _: ()) {}
    }
}
