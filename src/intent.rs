use crate::schema::IntentKind;
use lazy_static::lazy_static;
use regex::Regex;

// Utterances containing any of these route to the planner instead of chat.
const AUTOMATION_KEYWORDS: &[&str] = &[
    "open", "launch", "start", "send", "text", "message", "call", "dial", "search", "play",
    "pause", "stop", "take", "photo", "picture", "screenshot", "swipe", "scroll", "tap", "click",
    "press", "turn on", "turn off", "enable", "disable", "set alarm", "remind me", "navigate to",
    "go to",
];

lazy_static! {
    static ref ACTION_VERB: Regex =
        Regex::new(r"(?i)^(open|launch|start|send|call|text|search|play|take|turn|set|navigate|go to)\s+")
            .unwrap();
}

pub fn classify(text: &str) -> IntentKind {
    let lower = text.to_lowercase();
    if contains_any(&lower, AUTOMATION_KEYWORDS) || ACTION_VERB.is_match(text.trim()) {
        IntentKind::Automation
    } else {
        IntentKind::Chat
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_routes_to_automation() {
        assert_eq!(classify("please open chrome"), IntentKind::Automation);
        assert_eq!(classify("remind me to drink water"), IntentKind::Automation);
        assert_eq!(classify("Turn On wifi"), IntentKind::Automation);
    }

    #[test]
    fn test_leading_verb_routes_to_automation() {
        assert_eq!(classify("Send a hello to Sam"), IntentKind::Automation);
        assert_eq!(classify("Navigate to the nearest cafe"), IntentKind::Automation);
    }

    #[test]
    fn test_plain_questions_stay_chat() {
        assert_eq!(classify("how are you today"), IntentKind::Chat);
        assert_eq!(classify("what is the capital of France"), IntentKind::Chat);
    }
}
