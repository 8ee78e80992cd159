//! Prompt text sent to the suggestion service.

/// Names of the assets a composition was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetNames {
    pub video: String,
    pub audio: Option<String>,
    pub image: Option<String>,
}

/// Instructions framing the asset description.
pub const INSTRUCTIONS: &str = "You are an AI assistant specialized in generating marketing copy for videos.
Your task is to generate several compelling titles and concise descriptions for a video.

Generate 3 to 5 distinct options for both the title and the description.
Ensure that the titles are catchy and engaging, and the descriptions are informative yet brief, highlighting the key aspects or benefits of the video.
Reply with a JSON object: {\"titles\": [...], \"descriptions\": [...]}.";

/// One-sentence description of the composition.
pub fn build_prompt(names: &AssetNames) -> String {
    format!(
        "A video combining a screen recording named \"{}\" and an audio track named \"{}\". The visual cover is \"{}\". It's a professional media project.",
        names.video,
        names.audio.as_deref().unwrap_or("undefined"),
        names.image.as_deref().unwrap_or("undefined"),
    )
}

/// Full request text: instructions followed by the description.
pub fn full_request(video_prompt: &str) -> String {
    format!("{INSTRUCTIONS}\n\nVideo Content/Purpose Prompt: {video_prompt}")
}
