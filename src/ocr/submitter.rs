//! Recognition submitter — one backend call per confirmed region, never two
//! at once.

use super::{
    RecognitionBackend, RecognitionError, RecognitionRequest, RecognitionResponse,
    NO_TEXT_FAILURE,
};
use crate::raster::RasterizedRegion;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct RecognitionSubmitter<B> {
    backend: B,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the request finishes or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<B: RecognitionBackend> RecognitionSubmitter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Send the region and return the recognized text.
    ///
    /// Fails fast with `Busy` if a request from this submitter is still
    /// pending; that call never reaches the backend. Nothing is retried.
    pub async fn submit(&self, region: &RasterizedRegion) -> Result<String, RecognitionError> {
        let _guard = InFlight::acquire(&self.in_flight).ok_or_else(|| {
            log::warn!("[OCR] Submit refused — a request is already in flight");
            RecognitionError::Busy
        })?;

        let request = RecognitionRequest {
            base64_image: region.to_base64(),
        };
        let (w, h) = region.dimensions();
        log::info!(
            "[OCR] Submitting {}x{} region ({} bytes)",
            w,
            h,
            region.bytes().len()
        );

        let start = std::time::Instant::now();
        let result = self.backend.invoke(&request).await;
        let ms = start.elapsed().as_millis();

        match result {
            Ok(data) => {
                let text = extract_text(data)?;
                log::info!("[OCR] Extracted {} chars in {}ms", text.chars().count(), ms);
                Ok(text)
            }
            Err(failure) => {
                log::warn!(
                    "[OCR] Backend failed after {}ms (status {:?}): {}",
                    ms,
                    failure.status,
                    failure.message.as_deref().unwrap_or("<no message>")
                );
                Err(RecognitionError::from_failure(failure))
            }
        }
    }
}

/// Pull `text` out of a response payload.
///
/// A payload without usable text but with an `error` string is treated as
/// an upstream failure; anything else unusable gets the generic message.
fn extract_text(data: serde_json::Value) -> Result<String, RecognitionError> {
    if let Some(upstream) = data.get("error").and_then(|e| e.as_str()) {
        if data.get("text").is_none() && !upstream.trim().is_empty() {
            return Err(RecognitionError::upstream(upstream));
        }
    }
    match serde_json::from_value::<RecognitionResponse>(data) {
        Ok(response) if !response.text.trim().is_empty() => Ok(response.text),
        Ok(_) => {
            log::warn!("[OCR] Backend returned empty text");
            Err(RecognitionError::generic(NO_TEXT_FAILURE))
        }
        Err(e) => {
            log::warn!("[OCR] Malformed backend response: {}", e);
            Err(RecognitionError::generic(NO_TEXT_FAILURE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CapturedImage;
    use crate::crop::{PixelRegion, ScaleFactors};
    use crate::ocr::{BackendFailure, GENERIC_FAILURE};
    use crate::raster::{rasterize, RasterOptions};
    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tokio::sync::Notify;

    struct Canned {
        reply: Result<Value, BackendFailure>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl Canned {
        fn new(reply: Result<Value, BackendFailure>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl RecognitionBackend for Canned {
        async fn invoke(&self, request: &RecognitionRequest) -> Result<Value, BackendFailure> {
            assert!(!request.base64_image.is_empty());
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply.clone()
        }
    }

    fn region() -> RasterizedRegion {
        let image = CapturedImage::from_frame(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            20,
            20,
            Rgb([0, 0, 0]),
        )))
        .unwrap();
        let px = PixelRegion {
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 20.0,
        };
        rasterize(&image, &px, ScaleFactors::IDENTITY, &RasterOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn returns_backend_text() {
        let submitter =
            RecognitionSubmitter::new(Canned::new(Ok(json!({ "text": "Amazing grace" }))));
        assert_eq!(submitter.submit(&region()).await.unwrap(), "Amazing grace");
        assert!(!submitter.is_in_flight());
    }

    #[tokio::test]
    async fn upstream_message_is_preserved() {
        let submitter = RecognitionSubmitter::new(Canned::new(Err(BackendFailure::new(
            Some("Google Vision API key invalid".to_string()),
            Some(400),
        ))));
        let err = submitter.submit(&region()).await.unwrap_err();
        assert_eq!(err, RecognitionError::upstream("Google Vision API key invalid"));
        assert!(!submitter.is_in_flight());
    }

    #[tokio::test]
    async fn failure_without_message_is_generic() {
        let submitter =
            RecognitionSubmitter::new(Canned::new(Err(BackendFailure::new(None, None))));
        let err = submitter.submit(&region()).await.unwrap_err();
        assert_eq!(err.to_string(), GENERIC_FAILURE);
    }

    #[tokio::test]
    async fn missing_or_malformed_data_is_a_generic_failure() {
        for reply in [
            Value::Null,
            json!({}),
            json!({ "text": 42 }),
            json!({ "text": "   " }),
            json!("plain string"),
        ] {
            let submitter = RecognitionSubmitter::new(Canned::new(Ok(reply.clone())));
            let err = submitter.submit(&region()).await.unwrap_err();
            assert_eq!(err, RecognitionError::generic(NO_TEXT_FAILURE), "reply {}", reply);
            assert!(!err.to_string().is_empty());
        }
    }

    #[tokio::test]
    async fn error_field_in_payload_is_upstream() {
        let submitter =
            RecognitionSubmitter::new(Canned::new(Ok(json!({ "error": "Image too large" }))));
        let err = submitter.submit(&region()).await.unwrap_err();
        assert_eq!(err.to_string(), "Image too large");
    }

    #[tokio::test]
    async fn second_submit_while_pending_is_refused() {
        let gate = Arc::new(Notify::new());
        let mut backend = Canned::new(Ok(json!({ "text": "verse one" })));
        backend.gate = Some(Arc::clone(&gate));
        let submitter = RecognitionSubmitter::new(backend);
        let region = region();

        let (first, second) = tokio::join!(submitter.submit(&region), async {
            tokio::task::yield_now().await;
            let second = submitter.submit(&region).await;
            gate.notify_one();
            second
        });

        assert_eq!(first.unwrap(), "verse one");
        assert_eq!(second.unwrap_err(), RecognitionError::Busy);
        assert_eq!(submitter.backend().calls.load(Ordering::SeqCst), 1);
        assert!(!submitter.is_in_flight());
    }
}
