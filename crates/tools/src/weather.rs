//! Weather tool: offline forecast stub.
//!
//! Produces a plausible, repeatable report for any place name so the
//! assistant can be exercised without a weather API key. Swap in a real
//! backend by registering a different tool under the same name.

use async_trait::async_trait;
use daisy_core::error::ToolError;
use daisy_core::tool::Tool;
use tokio_util::sync::CancellationToken;

pub struct WeatherTool;

const CONDITIONS: [&str; 7] = [
    "clear",
    "partly cloudy",
    "overcast",
    "light rain",
    "steady rain",
    "thunderstorms",
    "snow",
];

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "Weather"
    }

    fn description(&self) -> &str {
        "Current weather conditions for a place: temperature, sky and wind."
    }

    fn argument_format(&self) -> &str {
        "<place>[, fahrenheit]"
    }

    fn examples(&self) -> &[&str] {
        &[
            "what's the weather like",
            "what is the weather in Paris",
            "is it going to rain today",
            "how hot is it outside",
            "do I need an umbrella",
            "what's the temperature in Tokyo",
        ]
    }

    async fn execute(&self, argument: &str, cancel: &CancellationToken) -> Result<String, ToolError> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled(self.name().into()));
        }

        let (place, fahrenheit) = parse_argument(argument)?;
        Ok(report(place, fahrenheit))
    }
}

fn parse_argument(argument: &str) -> Result<(&str, bool), ToolError> {
    let argument = argument.trim();
    let (place, unit) = match argument.rsplit_once(',') {
        Some((place, unit)) if is_unit(unit) => (place.trim(), unit.trim()),
        _ => (argument, ""),
    };

    if place.is_empty() {
        return Err(ToolError::InvalidArguments("a place name is required".into()));
    }
    Ok((place, unit.eq_ignore_ascii_case("fahrenheit") || unit.eq_ignore_ascii_case("f")))
}

fn is_unit(s: &str) -> bool {
    let s = s.trim();
    ["fahrenheit", "f", "celsius", "c"]
        .iter()
        .any(|u| s.eq_ignore_ascii_case(u))
}

/// Seeded from the lowercased place name, so the same place always
/// reports the same weather.
fn report(place: &str, fahrenheit: bool) -> String {
    let seed = place
        .to_lowercase()
        .bytes()
        .fold(2166136261u32, |acc, b| (acc ^ b as u32).wrapping_mul(16777619));

    let celsius = (seed % 38) as i32 - 6;
    let sky = CONDITIONS[(seed >> 8) as usize % CONDITIONS.len()];
    let wind_kmh = 3 + (seed >> 16) % 35;

    let temperature = if fahrenheit {
        format!("{}°F", celsius * 9 / 5 + 32)
    } else {
        format!("{celsius}°C")
    };

    format!("{place}: {sky}, {temperature}, wind {wind_kmh} km/h")
}
