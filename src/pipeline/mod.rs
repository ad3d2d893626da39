//! Pipeline stages for batch PDF-to-text conversion.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ batch ──▶ encode ──▶ ocr ──▶ (harmonize) ──▶ postprocess
//! (dir scan) (pdfium)  (chunks)  (base64)   (VLM)    (VLM, text)      (cleanup)
//! ```
//!
//! 1. [`input`]  — list candidate PDFs, validate magic bytes, map output paths
//! 2. [`render`] — rasterise every page to a JPEG file; blocking, run via
//!    `spawn_blocking`
//! 3. [`batch`]  — partition the pages into fixed-size contiguous batches
//! 4. [`encode`] — decode-check and base64-wrap each page image
//! 5. [`ocr`]    — one transcription request per batch
//! 6. [`llm`]    — timeout + retry around every model call
//! 7. [`harmonize`] — optional second pass that removes batch markers
//! 8. [`postprocess`] — deterministic text cleanup (opt-in)
//! 9. [`verify`] — optional per-batch page check against the transcription

pub mod batch;
pub mod encode;
pub mod harmonize;
pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
pub mod verify;
