//! Fixed reply texts and templates.

use super::search::SearchResult;
use super::weather::WeatherReport;

pub const GREETING: &str = "Hi! I can tell you the weather, search Google and Habr, \
and turn voice messages into text. Send /help to see how.";
pub const CITY_PROMPT: &str = "Please enter a city name, e.g. /weather Moscow";
pub const QUERY_PROMPT: &str = "Please enter a search query, e.g. /google rust tokio";
pub const ECHO_PREFIX: &str = "Got your message: ";
pub const WEATHER_UNAVAILABLE: &str = "The weather service is unavailable right now, please try again later.";
pub const SEARCH_FAILED: &str = "The search failed, please try again later.";
pub const SPEECH_UNRECOGNIZABLE: &str = "Could not recognize speech in this voice message.";
pub const SPEECH_FAILED: &str = "Failed to recognize speech: the recognition service is unavailable, please try again later.";

pub fn format_weather(report: &WeatherReport) -> String {
    format!(
        "In {} it is {}, current temperature {}°C, minimum {}°C, maximum {}°C, pressure {} hPa.",
        report.city_name,
        report.description,
        report.current_temp,
        report.min_temp,
        report.max_temp,
        report.pressure
    )
}

pub fn format_not_found_by_city(name: &str) -> String {
    format!("Could not find the weather for this city: {name}. Please check the spelling.")
}

pub fn format_not_found_by_coordinates(latitude: f64, longitude: f64) -> String {
    format!("Could not find the weather for your location ({latitude}, {longitude}).")
}

pub fn format_echo(body: &str) -> String {
    format!("{ECHO_PREFIX}{body}")
}

pub fn format_query_echo(query: &str) -> String {
    format!("Results for \"{query}\":")
}

pub fn format_no_results(query: &str) -> String {
    format!("Nothing found for \"{query}\".")
}

pub fn format_voice_too_long(max_secs: u32) -> String {
    format!("This voice message is too long, I can only transcribe up to {max_secs} seconds.")
}

/// Title and description (when the provider has them) above the link.
pub fn format_search_result(result: &SearchResult) -> String {
    let mut lines = Vec::with_capacity(3);
    if let Some(title) = &result.title {
        lines.push(title.as_str());
    }
    if let Some(description) = &result.description {
        lines.push(description.as_str());
    }
    lines.push(result.link.as_str());
    lines.join("\n")
}
