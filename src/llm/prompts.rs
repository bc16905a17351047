use crate::models::WeatherSnapshot;

pub const TOPIC_SYSTEM_PROMPT: &str = r#"You are a local news editor for a regional news aggregator.
You read articles from newspapers, radio stations and community organizations and turn them into short, structured news items.

Some articles are roundups that cover several unrelated stories (police blotters, "news in brief", council meeting recaps covering many agenda items).
Split those into one item per distinct story. A normal article is a single item.

You must respond with valid JSON matching this exact schema:
{
    "topics": [
        {
            "title": "string (short headline for this item)",
            "location": "string (city or town the item is about, or \"Unknown\")",
            "is_local": true or false (true if about the source city or nearby towns in the same county),
            "bullet": "string (1-2 sentence punchy summary)",
            "priority": 1-5
        }
    ]
}

Priority scale:
5 = major breaking local news, emergencies, significant policy changes
4 = important community events or developments
3 = regular local news, routine meetings and announcements
2 = minor events and low-impact updates
1 = filler, listings, very low local relevance

Respond with JSON only."#;

/// One text-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct TopicRequest<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub default_location: &'a str,
    pub char_budget: usize,
}

impl TopicRequest<'_> {
    pub fn to_prompt(&self) -> String {
        let text = if self.body.trim().is_empty() {
            self.title.to_string()
        } else {
            truncate_chars(self.body, self.char_budget)
        };

        format!(
            "The source is from: {}\n\nArticle title: {}\nArticle content:\n{}\n\nProvide your analysis as JSON:\n",
            self.default_location, self.title, text
        )
    }

    pub fn into_completion(self) -> CompletionRequest {
        CompletionRequest {
            system: Some(TOPIC_SYSTEM_PROMPT.to_string()),
            prompt: self.to_prompt(),
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherBulletRequest<'a> {
    pub city: &'a str,
    pub region: &'a str,
    pub snapshot: &'a WeatherSnapshot,
}

impl WeatherBulletRequest<'_> {
    pub fn to_prompt(&self) -> String {
        let w = self.snapshot;
        let show = |v: Option<i64>| v.map(|t| t.to_string()).unwrap_or_else(|| "n/a".to_string());

        format!(
            "Summarize this weather data into a single punchy sentence for {}, {}.\n\n\
             Current temp: {}°F\n\
             Conditions: {}\n\
             High: {}°F\n\
             Low: {}°F\n\
             Precipitation chance: {}%\n\
             Detailed forecast: {}\n\
             Temperature trend: {}\n\n\
             Respond with ONLY the bullet, no prefix. Be concise and conversational, like a local weather report.",
            self.city,
            self.region,
            show(w.current_temp),
            w.current_conditions.as_deref().unwrap_or("n/a"),
            show(w.forecast_high),
            show(w.forecast_low),
            w.precip_chance.unwrap_or(0),
            w.detailed_forecast.as_deref().unwrap_or("n/a"),
            w.temperature_trend.as_deref().unwrap_or("steady"),
        )
    }

    pub fn into_completion(self) -> CompletionRequest {
        CompletionRequest {
            system: None,
            prompt: self.to_prompt(),
            max_tokens: 100,
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
