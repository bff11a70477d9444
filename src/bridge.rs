//! Notification calls: argument validation, building and display
//!
//! A [`Session`] is the initialized connection to the notification
//! service. Calls only exist as methods on a live session, and the service
//! is torn down when the session is dropped.

use crate::errors::{BridgeError, Result};
use crate::hint;
use crate::native::{HeapAllocator, NativeString, StringAllocator};
use crate::notify::{NotificationGuard, NotificationService};
use crate::term::{latin1_len, Term};

/// Longest application name accepted at initialization, in Latin-1 bytes
pub const MAX_APP_NAME_LEN: usize = 1023;

/// Outcome of a call as reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    NoMemory,
    BadArg,
}

impl Reply {
    pub fn from_result(result: &Result<()>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(BridgeError::NoMemory) => Self::NoMemory,
            Err(_) => Self::BadArg,
        }
    }

    /// `ok`, `{error, enomem}` or `badarg`
    pub fn to_term(self) -> Term {
        match self {
            Self::Ok => Term::atom("ok"),
            Self::NoMemory => Term::Tuple(vec![Term::atom("error"), Term::atom("enomem")]),
            Self::BadArg => Term::atom("badarg"),
        }
    }
}

/// Validated `notify` arguments
#[derive(Debug, Clone, Copy)]
pub struct NotifyCall<'t> {
    pub summary: &'t Term,
    pub body: &'t Term,
    pub icon: &'t Term,
    pub category: &'t Term,
    pub urgency: i32,
    pub timeout: i32,
    pub hints: &'t [Term],
}

/// Initialized notification service plus the allocator for transient strings
pub struct Session<S: NotificationService, A: StringAllocator = HeapAllocator> {
    service: S,
    alloc: A,
    app_name: String,
}

impl<S: NotificationService> Session<S> {
    /// Connect to the notification server as `app_name`.
    ///
    /// The name is checked before the server is contacted.
    pub fn init(app_name: &str) -> Result<Self> {
        validate_app_name(app_name)?;
        let service = S::connect(app_name)?;
        Self::with_service(app_name, service, HeapAllocator)
    }
}

impl<S: NotificationService, A: StringAllocator> Session<S, A> {
    pub fn with_service(app_name: &str, service: S, alloc: A) -> Result<Self> {
        validate_app_name(app_name)?;
        tracing::info!(app_name, "Notification session initialized");
        Ok(Self {
            service,
            alloc,
            app_name: app_name.to_string(),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    #[cfg(test)]
    pub fn service(&self) -> &S {
        &self.service
    }

    #[cfg(test)]
    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// `notify/7` entry point.
    ///
    /// Checks argument shapes before anything is allocated, then builds and
    /// shows the notification.
    pub fn notify(&self, args: &[Term]) -> Result<()> {
        let [summary, body, icon, category, urgency, timeout, hints] = args else {
            return Err(BridgeError::BadArgument("notify expects 7 arguments"));
        };

        for text in [summary, body, icon, category] {
            if text.iolist_size().is_none() {
                return Err(BridgeError::BadArgument("expected iolist or binary"));
            }
        }
        let urgency = urgency
            .as_i32()
            .ok_or(BridgeError::BadArgument("urgency must be an integer"))?;
        let timeout = timeout
            .as_i32()
            .ok_or(BridgeError::BadArgument("timeout must be an integer"))?;
        let Term::List(hints) = hints else {
            return Err(BridgeError::BadArgument("hints must be a list"));
        };

        self.build_and_show(NotifyCall {
            summary,
            body,
            icon,
            category,
            urgency,
            timeout,
            hints,
        })
    }

    /// Build the notification, apply hints in order and request display.
    ///
    /// Stops at the first bad hint without displaying. The notification and
    /// every transient string are released exactly once on all paths.
    pub fn build_and_show(&self, call: NotifyCall<'_>) -> Result<()> {
        let span = tracing::debug_span!("notify", hints = call.hints.len());
        let _enter = span.enter();

        let summary = NativeString::from_term(call.summary, &self.alloc)?;
        let body = NativeString::from_term(call.body, &self.alloc)?;
        let icon = NativeString::from_term(call.icon, &self.alloc)?;
        let category = NativeString::from_term(call.category, &self.alloc)?;

        let mut notification = NotificationGuard::new(
            &self.service,
            self.service
                .create(summary.as_c_str(), body.as_c_str(), icon.as_c_str()),
        );

        self.service
            .set_category(notification.handle_mut(), category.as_c_str());
        self.service
            .set_urgency(notification.handle_mut(), call.urgency);
        self.service
            .set_timeout(notification.handle_mut(), call.timeout);

        for (index, entry) in call.hints.iter().enumerate() {
            if let Err(e) =
                hint::apply_entry(&self.service, notification.handle_mut(), entry, &self.alloc)
            {
                tracing::debug!(index, hint = %entry, error = %e, "Hint rejected, notification dropped");
                return Err(e);
            }
        }

        if let Err(e) = self.service.show(notification.handle_mut()) {
            tracing::warn!(summary = %summary.to_string_lossy(), error = %e, "Notification not displayed");
        } else {
            tracing::debug!(summary = %summary.to_string_lossy(), "Notification shown");
        }

        Ok(())
    }
}

impl<S: NotificationService, A: StringAllocator> Drop for Session<S, A> {
    fn drop(&mut self) {
        self.service.shutdown();
        tracing::info!(app_name = %self.app_name, "Notification session closed");
    }
}

/// Application names must be non-empty Latin-1 of at most 1023 bytes
pub fn validate_app_name(app_name: &str) -> Result<()> {
    match latin1_len(app_name) {
        None => Err(BridgeError::InvalidAppName("must be Latin-1")),
        Some(0) => Err(BridgeError::InvalidAppName("must not be empty")),
        Some(len) if len > MAX_APP_NAME_LEN => {
            Err(BridgeError::InvalidAppName("longer than 1023 bytes"))
        }
        Some(_) => Ok(()),
    }
}
