use std::rc::Rc;

use tracing::debug;

use crate::Result;
use crate::codec::{self, RESERVED_KEY};
use crate::env::Environment;
use crate::value::{Cast, StateMapping, StateValue};

/// Reads and writes named state in the page fragment.
///
/// Every write assigns the full address, so it is observed like any other
/// navigation: by the host's `hashchange` or by the next poll tick.
#[derive(Clone)]
pub struct StateAccessor {
    env: Rc<dyn Environment>,
}

fn usable_key(key: &str) -> bool {
    !key.is_empty() && key != RESERVED_KEY
}

impl StateAccessor {
    pub fn new(env: Rc<dyn Environment>) -> Self {
        Self { env }
    }

    /// Value under `key` cast as requested. The empty and reserved keys are
    /// always `None`; an absent key is `None` only for [`Cast::String`].
    pub fn get(&self, key: &str, cast: Cast) -> Option<StateValue> {
        if !usable_key(key) {
            return None;
        }
        cast.apply(self.raw(key).as_deref())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key, Cast::String)? {
            StateValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key, Cast::Integer)?.as_int()
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key, Cast::Float)?.as_float()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key, Cast::Boolean)?.as_bool()
    }

    /// Whole fragment decoded, reserved key excluded.
    pub fn snapshot(&self) -> StateMapping {
        codec::decode(&codec::hash_of(&self.env.location()))
    }

    fn raw(&self, key: &str) -> Option<String> {
        let hash = codec::hash_of(&self.env.location());
        let body = hash.strip_prefix('#').unwrap_or(&hash);
        codec::split_tokens(body)
            .find(|token| codec::token_key(token) == key)
            .map(|token| codec::decode_component(codec::token_value(token)))
    }

    /// Writes one key. With `merge`, an existing token is replaced where it
    /// stands and a new one is appended; without, the fragment becomes this
    /// single token.
    pub fn set(&self, key: &str, value: impl Into<StateValue>, merge: bool) -> Result<()> {
        if !usable_key(key) {
            return Ok(());
        }
        let value = value.into();
        let href = self.env.location();
        let base = codec::full_uri(&href)?;
        let current = codec::hash_of(&href);
        let token = codec::token(key, &value);

        let hash = if !merge {
            format!("#{token}")
        } else if self.raw(key).is_some() {
            let normalized = current.strip_prefix("#&").unwrap_or(&current[1..]);
            let tokens = codec::split_tokens(normalized)
                .map(|existing| {
                    if codec::token_key(existing) == key {
                        token.clone()
                    } else {
                        existing.to_string()
                    }
                })
                .collect::<Vec<_>>();
            format!("#{}", tokens.join("&"))
        } else if current.is_empty() {
            format!("#{token}")
        } else {
            let normalized = current.strip_prefix("#&").unwrap_or(&current[1..]);
            format!("#{normalized}&{token}")
        };

        debug!(key, value = %value, merge, hash = %hash, "pushing state");
        self.env.navigate(&format!("{base}{hash}"));
        Ok(())
    }

    /// Writes every key of `mapping`. Merging into an empty fragment is the
    /// same as replacing it.
    pub fn set_all(&self, mapping: &StateMapping, merge: bool) -> Result<()> {
        let href = self.env.location();
        let base = codec::full_uri(&href)?;
        let current = codec::hash_of(&href);
        let merge = merge && !current.is_empty();

        let hash = if merge {
            let mut tokens = codec::split_tokens(&current[1..])
                .map(str::to_string)
                .collect::<Vec<_>>();
            for (key, value) in mapping.iter().filter(|(key, _)| usable_key(key)) {
                let token = codec::token(key, value);
                let mut found = false;
                for existing in tokens.iter_mut() {
                    if codec::token_key(existing) == key {
                        *existing = token.clone();
                        found = true;
                    }
                }
                if !found {
                    tokens.push(token);
                }
            }
            format!("#{}", tokens.join("&"))
        } else {
            codec::encode(mapping)
        };

        debug!(keys = mapping.len(), merge, hash = %hash, "pushing states");
        self.env.navigate(&format!("{base}{hash}"));
        Ok(())
    }

    /// Without a key, clears the fragment. With a key, drops every token for
    /// it; an absent key leaves the address untouched.
    pub fn remove(&self, key: Option<&str>) -> Result<()> {
        let href = self.env.location();
        let base = codec::full_uri(&href)?;
        let Some(key) = key else {
            debug!("clearing state");
            self.env.navigate(&format!("{base}#"));
            return Ok(());
        };
        if !usable_key(key) || self.raw(key).is_none() {
            return Ok(());
        }

        let hash = codec::hash_of(&href);
        let remaining = codec::split_tokens(hash.strip_prefix('#').unwrap_or(&hash))
            .filter(|token| !token.is_empty() && codec::token_key(token) != key)
            .collect::<Vec<_>>()
            .join("&");
        debug!(key, hash = %remaining, "removing state");
        self.env.navigate(&format!("{base}#{remaining}"));
        Ok(())
    }
}
