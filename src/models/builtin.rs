use super::family::ModelFamily;
use super::registry::ModelRegistry;
use super::spec::ModelSpec;

const GPT4_PREVIEW_CONTEXT: usize = 128_000;
const GPT4_CONTEXT: usize = 8_192;
const GPT4_32K_CONTEXT: usize = 32_768;
const GPT35_CONTEXT: usize = 16_385;

pub const BUILTIN_MODELS: &[ModelSpec] = &[
    ModelSpec::new("gpt-4-turbo", GPT4_PREVIEW_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-turbo-preview", GPT4_PREVIEW_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-0125-preview", GPT4_PREVIEW_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-1106-preview", GPT4_PREVIEW_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-vision-preview", GPT4_PREVIEW_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-1106-vision-preview", GPT4_PREVIEW_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4", GPT4_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-0613", GPT4_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-32k", GPT4_32K_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-4-32k-0613", GPT4_32K_CONTEXT, ModelFamily::Gpt4),
    ModelSpec::new("gpt-3.5-turbo", GPT35_CONTEXT, ModelFamily::Gpt35),
    ModelSpec::new("gpt-3.5-turbo-0125", GPT35_CONTEXT, ModelFamily::Gpt35),
    ModelSpec::new("gpt-3.5-turbo-1106", GPT35_CONTEXT, ModelFamily::Gpt35),
];

pub fn register_all(registry: &mut ModelRegistry) {
    for spec in BUILTIN_MODELS {
        registry.register(*spec);
    }
}
