use sui_youtube::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerMatch {
    pub index: usize,
}

/// Latest message in the page whose text contains any trigger,
/// case-insensitive. Reverse scan, so the first hit is the
/// chronologically newest. Which trigger fired is not reported.
pub fn find_latest_trigger(messages: &[ChatMessage], triggers: &[String]) -> Option<TriggerMatch> {
    messages.iter().enumerate().rev().find_map(|(index, msg)| {
        let text = msg.text.to_lowercase();
        triggers
            .iter()
            .any(|t| text.contains(t.to_lowercase().as_str()))
            .then_some(TriggerMatch { index })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sui_youtube::MessageId;

    fn msg(id: &str, text: &str) -> ChatMessage {
        ChatMessage {
            id: MessageId::new(id),
            author: "viewer".to_string(),
            text: text.to_string(),
            published_at: Utc::now(),
        }
    }

    fn triggers() -> Vec<String> {
        vec!["sui sui".to_string(), "hey sui".to_string()]
    }

    #[test]
    fn empty_page_has_no_match() {
        assert_eq!(find_latest_trigger(&[], &triggers()), None);
    }

    #[test]
    fn page_without_triggering_text_has_no_match() {
        let page = vec![msg("a", "hello"), msg("b", "great stream"), msg("c", "gg")];
        assert_eq!(find_latest_trigger(&page, &triggers()), None);
    }

    #[test]
    fn latest_of_several_matches_wins() {
        let page = vec![
            msg("a", "sui sui what's up"),
            msg("b", "unrelated"),
            msg("c", "hey sui how are you"),
            msg("d", "bye"),
        ];
        assert_eq!(
            find_latest_trigger(&page, &triggers()),
            Some(TriggerMatch { index: 2 })
        );
    }

    #[test]
    fn matching_is_case_insensitive_substring_containment() {
        let page = vec![msg("a", "HEY SUI!! tell us a joke")];
        assert_eq!(
            find_latest_trigger(&page, &triggers()),
            Some(TriggerMatch { index: 0 })
        );

        let embedded = vec![msg("b", "everyone say heY SuI now")];
        assert_eq!(
            find_latest_trigger(&embedded, &triggers()),
            Some(TriggerMatch { index: 0 })
        );
    }

    #[test]
    fn any_configured_trigger_suffices() {
        let page = vec![msg("a", "sui sui and also hey sui")];
        assert!(find_latest_trigger(&page, &triggers()).is_some());
    }
}
