use std::fmt;
use std::rc::Rc;

pub const HASHCHANGE: &str = "hashchange";

/// Callback invoked once per detected fragment change.
pub type Listener = Rc<dyn Fn(&ChangeEvent) -> anyhow::Result<()>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub event_type: String,
    /// Address before the change, when the source knows it.
    pub old_url: Option<String>,
    pub new_url: Option<String>,
}

impl ChangeEvent {
    pub fn hashchange() -> Self {
        Self {
            event_type: HASHCHANGE.to_string(),
            old_url: None,
            new_url: None,
        }
    }

    pub fn with_urls(old_url: impl Into<String>, new_url: impl Into<String>) -> Self {
        Self {
            event_type: HASHCHANGE.to_string(),
            old_url: Some(old_url.into()),
            new_url: Some(new_url.into()),
        }
    }

    pub fn is_hashchange(&self) -> bool {
        self.event_type == HASHCHANGE
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_type)?;
        if let Some(new_url) = &self.new_url {
            write!(f, " -> {new_url}")?;
        }
        Ok(())
    }
}
