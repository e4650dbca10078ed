use crate::env::FrameId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HistoryTarget {
    Page,
    Frame(FrameId),
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    target: HistoryTarget,
    url: String,
}

/// Joint session history shared by the page and its frames. Traversal
/// restores only the browsing context that owns the entry being left or
/// entered.
#[derive(Debug, Clone)]
pub(crate) struct SessionHistory {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl SessionHistory {
    pub(crate) fn new(page_url: &str) -> Self {
        Self {
            entries: vec![HistoryEntry {
                target: HistoryTarget::Page,
                url: page_url.to_string(),
            }],
            index: 0,
        }
    }

    pub(crate) fn push(&mut self, target: HistoryTarget, url: &str) {
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry {
            target,
            url: url.to_string(),
        });
        self.index = self.entries.len() - 1;
    }

    /// Steps back one entry. Returns the context to restore and its URL at
    /// the new position; `None` for the URL means the context has no earlier
    /// entry and falls back to what it was created with.
    pub(crate) fn back(&mut self) -> Option<(HistoryTarget, Option<String>)> {
        if self.index == 0 {
            return None;
        }
        let leaving = self.entries[self.index].target;
        self.index -= 1;
        let url = self.entries[..=self.index]
            .iter()
            .rev()
            .find(|entry| entry.target == leaving)
            .map(|entry| entry.url.clone());
        Some((leaving, url))
    }

    pub(crate) fn forward(&mut self) -> Option<(HistoryTarget, String)> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        let entry = &self.entries[self.index];
        Some((entry.target, entry.url.clone()))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_restores_only_the_leaving_context() {
        let frame = HistoryTarget::Frame(FrameId(1));
        let mut history = SessionHistory::new("https://app.local/");
        history.push(frame, "about:blank#a=1");
        history.push(frame, "about:blank#a=2");

        assert_eq!(
            history.back(),
            Some((frame, Some("about:blank#a=1".to_string())))
        );
        assert_eq!(history.back(), Some((frame, None)));
        assert_eq!(history.back(), None);
        assert_eq!(
            history.forward(),
            Some((frame, "about:blank#a=1".to_string()))
        );
    }

    #[test]
    fn push_drops_forward_entries() {
        let mut history = SessionHistory::new("https://app.local/");
        history.push(HistoryTarget::Page, "https://app.local/#a");
        history.push(HistoryTarget::Page, "https://app.local/#b");
        history.back();
        history.push(HistoryTarget::Page, "https://app.local/#c");
        assert_eq!(history.len(), 3);
        assert_eq!(history.index(), 2);
        assert_eq!(history.forward(), None);
    }
}
