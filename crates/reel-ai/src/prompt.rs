//! Prompt sent alongside the uploaded video.

pub const HIGHLIGHT_PROMPT: &str = r#"Analyze this video and identify the 3 to 5 most interesting or engaging moments.
For each moment, give the start time, the end time and a short description.

Return ONLY a JSON list and nothing else, in exactly this format:
[
  {"start": "MM:SS", "end": "MM:SS", "description": "What happens in this moment"}
]

Use "HH:MM:SS" instead of "MM:SS" when the video is an hour or longer.
Every end time must be later than its start time."#;
