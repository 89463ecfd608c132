// SPDX-License-Identifier: MPL-2.0

//! Barcode capture flow.
//!
//! The camera itself is out of scope: whatever drives it reports the
//! permission answer and every decoded barcode to a [`ScanFlow`], which
//! decides what to show and whether to hand the payload to a browser.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, info, warn};

static URL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)https?://\S").expect("valid url prefix regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeType {
    Qr,
    Ean13,
    Ean8,
    Code128,
    UpcA,
    UpcE,
}

/// Symbologies the camera is asked to decode.
pub const SUPPORTED_BARCODES: [BarcodeType; 6] = [
    BarcodeType::Qr,
    BarcodeType::Ean13,
    BarcodeType::Ean8,
    BarcodeType::Code128,
    BarcodeType::UpcA,
    BarcodeType::UpcE,
];

impl BarcodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            BarcodeType::Qr => "qr",
            BarcodeType::Ean13 => "ean13",
            BarcodeType::Ean8 => "ean8",
            BarcodeType::Code128 => "code128",
            BarcodeType::UpcA => "upc_a",
            BarcodeType::UpcE => "upc_e",
        }
    }
}

impl fmt::Display for BarcodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported barcode type: {0}")]
pub struct UnsupportedBarcode(pub String);

impl FromStr for BarcodeType {
    type Err = UnsupportedBarcode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SUPPORTED_BARCODES
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedBarcode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    pub fn flipped(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CameraFacing::Back => "back",
            CameraFacing::Front => "front",
        }
    }
}

/// What a decoded barcode turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Url(String),
    Text(String),
}

impl Payload {
    pub fn as_str(&self) -> &str {
        match self {
            Payload::Url(s) | Payload::Text(s) => s,
        }
    }
}

/// URLs get opened, everything else (UPCs, free text) is shown as is.
pub fn classify(data: &str) -> Payload {
    let trimmed = data.trim();
    if URL_PREFIX_RE.is_match(trimmed) {
        Payload::Url(trimmed.to_string())
    } else {
        Payload::Text(data.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error("no handler for {0}")]
    NoHandler(String),
    #[error("failed to open link: {0}")]
    Failed(String),
}

/// Hands a URL to something outside the app.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), OpenError>;
}

/// Opens URLs with the desktop's default handler.
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<(), OpenError> {
        open::that(url).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OpenError::NoHandler(url.to_string()),
            _ => OpenError::Failed(e.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub kind: BarcodeType,
    pub payload: Payload,
    /// Set when a URL payload could not be handed off
    pub open_error: Option<OpenError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    AwaitingPermission,
    Scanning,
    Captured(Capture),
    /// Stays here until the user asks again
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Not scanning, or a capture is already on screen
    Ignored,
    Captured(Capture),
}

pub struct ScanFlow {
    state: ScanState,
    facing: CameraFacing,
    opener: Arc<dyn UrlOpener>,
}

impl ScanFlow {
    pub fn new(opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            state: ScanState::AwaitingPermission,
            facing: CameraFacing::default(),
            opener,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    pub fn flip(&mut self) -> CameraFacing {
        self.facing = self.facing.flipped();
        self.facing
    }

    /// Apply the answer to the camera permission prompt. Only meaningful
    /// while waiting for it.
    pub fn resolve_permission(&mut self, granted: bool) {
        if self.state != ScanState::AwaitingPermission {
            debug!("permission answer outside the prompt, ignoring");
            return;
        }
        self.state = if granted {
            ScanState::Scanning
        } else {
            info!("camera permission denied");
            ScanState::Denied
        };
    }

    /// The user pressed "Grant Permission" after a denial.
    pub fn retry_permission(&mut self) {
        if self.state == ScanState::Denied {
            self.state = ScanState::AwaitingPermission;
        }
    }

    /// Feed one decoded barcode into the flow.
    pub fn on_scanned(&mut self, kind: BarcodeType, data: &str) -> ScanEvent {
        if self.state != ScanState::Scanning {
            return ScanEvent::Ignored;
        }

        let payload = classify(data);
        let open_error = match &payload {
            Payload::Url(url) => match self.opener.open(url) {
                Ok(()) => None,
                Err(e) => {
                    warn!(error = %e, "could not open scanned link");
                    Some(e)
                }
            },
            Payload::Text(_) => None,
        };
        debug!(%kind, "barcode captured");

        let capture = Capture {
            kind,
            payload,
            open_error,
        };
        self.state = ScanState::Captured(capture.clone());
        ScanEvent::Captured(capture)
    }

    /// "Scan Again": drop the capture and resume decoding.
    pub fn scan_again(&mut self) {
        if matches!(self.state, ScanState::Captured(_)) {
            self.state = ScanState::Scanning;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{OpenError, UrlOpener};
    use std::sync::Mutex;

    /// Remembers every URL it was asked to open.
    #[derive(Default)]
    pub struct RecordingOpener {
        pub opened: Mutex<Vec<String>>,
        pub fail: bool,
    }

    impl RecordingOpener {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &str) -> Result<(), OpenError> {
            self.opened.lock().unwrap().push(url.to_string());
            if self.fail {
                Err(OpenError::NoHandler(url.to_string()))
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingOpener;
    use super::*;

    fn scanning(opener: Arc<RecordingOpener>) -> ScanFlow {
        let mut flow = ScanFlow::new(opener);
        flow.resolve_permission(true);
        flow
    }

    #[test]
    fn test_classify_url_and_text() {
        assert_eq!(
            classify("https://example.com"),
            Payload::Url("https://example.com".into())
        );
        assert_eq!(classify("012345678905"), Payload::Text("012345678905".into()));
        assert_eq!(classify("httpbin"), Payload::Text("httpbin".into()));
        assert_eq!(
            classify("HTTP://EXAMPLE.COM"),
            Payload::Url("HTTP://EXAMPLE.COM".into())
        );
    }

    #[test]
    fn test_url_payload_is_handed_off() {
        let opener = Arc::new(RecordingOpener::default());
        let mut flow = scanning(Arc::clone(&opener));

        let event = flow.on_scanned(BarcodeType::Qr, "https://example.com");

        assert_eq!(opener.opened(), vec!["https://example.com".to_string()]);
        let ScanEvent::Captured(capture) = event else {
            panic!("expected a capture");
        };
        assert_eq!(capture.payload, Payload::Url("https://example.com".into()));
        assert!(capture.open_error.is_none());
    }

    #[test]
    fn test_text_payload_is_not_opened() {
        let opener = Arc::new(RecordingOpener::default());
        let mut flow = scanning(Arc::clone(&opener));

        flow.on_scanned(BarcodeType::UpcA, "012345678905");

        assert!(opener.opened().is_empty());
        let ScanState::Captured(capture) = flow.state() else {
            panic!("expected captured state");
        };
        assert_eq!(capture.payload, Payload::Text("012345678905".into()));
    }

    #[test]
    fn test_opener_failure_is_reported_not_fatal() {
        let opener = Arc::new(RecordingOpener::failing());
        let mut flow = scanning(opener);

        let event = flow.on_scanned(BarcodeType::Qr, "https://example.com");

        let ScanEvent::Captured(capture) = event else {
            panic!("expected a capture");
        };
        assert!(matches!(capture.open_error, Some(OpenError::NoHandler(_))));
        flow.scan_again();
        assert_eq!(flow.state(), &ScanState::Scanning);
    }

    #[test]
    fn test_scans_ignored_while_captured() {
        let opener = Arc::new(RecordingOpener::default());
        let mut flow = scanning(Arc::clone(&opener));

        flow.on_scanned(BarcodeType::Qr, "https://one.example");
        let second = flow.on_scanned(BarcodeType::Qr, "https://two.example");

        assert_eq!(second, ScanEvent::Ignored);
        assert_eq!(opener.opened().len(), 1);

        flow.scan_again();
        flow.on_scanned(BarcodeType::Qr, "https://two.example");
        assert_eq!(opener.opened().len(), 2);
    }

    #[test]
    fn test_denied_until_user_retries() {
        let mut flow = ScanFlow::new(Arc::new(RecordingOpener::default()));
        flow.resolve_permission(false);
        assert_eq!(flow.state(), &ScanState::Denied);

        assert_eq!(
            flow.on_scanned(BarcodeType::Ean13, "4006381333931"),
            ScanEvent::Ignored
        );
        flow.resolve_permission(true);
        assert_eq!(flow.state(), &ScanState::Denied);

        flow.retry_permission();
        flow.resolve_permission(true);
        assert_eq!(flow.state(), &ScanState::Scanning);
    }

    #[test]
    fn test_flip_camera() {
        let mut flow = ScanFlow::new(Arc::new(RecordingOpener::default()));
        assert_eq!(flow.facing(), CameraFacing::Back);
        assert_eq!(flow.flip(), CameraFacing::Front);
        assert_eq!(flow.flip(), CameraFacing::Back);
    }

    #[test]
    fn test_barcode_type_names() {
        assert_eq!("upc_a".parse::<BarcodeType>(), Ok(BarcodeType::UpcA));
        assert_eq!("QR".parse::<BarcodeType>(), Ok(BarcodeType::Qr));
        assert!("pdf417".parse::<BarcodeType>().is_err());
    }
}
