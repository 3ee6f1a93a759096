//! Vision-LLM OCR engine: send the image to a multimodal model and ask for a
//! plain transcription.
//!
//! All prompt text lives in [`crate::prompts`]; this module only builds the
//! request, picks the provider and maps provider errors onto [`OcrError`].

use crate::config::ExtractionConfig;
use crate::error::{OcrError, Pdf2CsvError};
use crate::pipeline::encode;
use crate::pipeline::extract::ExtractedImage;
use crate::pipeline::ocr::{OcrEngine, Recognition};
use crate::prompts::TRANSCRIBE_SYSTEM_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Transcriptions must be verbatim, so sampling is kept near-deterministic.
const TEMPERATURE: f32 = 0.0;

/// A dense A4 invoice transcribes to roughly 1.5k tokens.
const MAX_TOKENS: usize = 4096;

/// OCR through an edgequake-llm vision provider.
pub struct VisionEngine {
    provider: Arc<dyn LLMProvider>,
}

impl VisionEngine {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }

    /// Build from `config`, resolving the provider as described on
    /// [`resolve_provider`].
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, Pdf2CsvError> {
        Ok(Self::new(resolve_provider(config)?))
    }
}

impl OcrEngine for VisionEngine {
    fn name(&self) -> &'static str {
        "vision"
    }

    /// The request is a system message with the transcription rules and a
    /// user turn carrying only the image.
    fn recognize<'a>(
        &'a self,
        image: &'a ExtractedImage,
    ) -> BoxFuture<'a, Result<Recognition, OcrError>> {
        Box::pin(async move {
            let image_data =
                encode::encode_image_data(&image.image).map_err(|e| OcrError::Image(e.to_string()))?;

            let messages = vec![
                ChatMessage::system(TRANSCRIBE_SYSTEM_PROMPT),
                ChatMessage::user_with_images("", vec![image_data]),
            ];

            let response = self
                .provider
                .chat(&messages, Some(&build_options()))
                .await
                .map_err(|e| OcrError::Failed(e.to_string()))?;

            debug!(
                "Page {} image {}: {} input tokens, {} output tokens",
                image.page_num, image.image_num, response.prompt_tokens, response.completion_tokens
            );

            Ok(Recognition {
                text: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            })
        })
    }
}

fn build_options() -> CompletionOptions {
    CompletionOptions {
        temperature: Some(TEMPERATURE),
        max_tokens: Some(MAX_TOKENS),
        ..Default::default()
    }
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is
/// 2. `config.provider_name` with `config.model` (default `gpt-4.1-nano`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2CsvError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2CsvError::OcrEngineUnavailable {
            engine: "vision".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2CsvError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2CsvError::OcrEngineUnavailable {
            engine: format!("vision ({provider_name})"),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_deterministic() {
        let opts = build_options();
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
