use std::rc::Rc;

use tracing::debug;

use crate::Result;
use crate::codec;
use crate::env::{Environment, FrameAttributes, FrameId};

/// Hidden same-origin frame whose fragment mirrors the page's.
///
/// Reopening the frame's document before assigning a fragment is what makes
/// legacy engines record a history entry, so the back button walks the
/// frame's entries even though the page fragment alone never creates any.
pub struct Bridge {
    env: Rc<dyn Environment>,
    frame: FrameId,
}

impl Bridge {
    /// Creates the frame and hands a ready bridge to `on_ready` once it has
    /// loaded and copied the page fragment. Errors from creation return
    /// here; errors while mirroring reach `on_ready`.
    pub(crate) fn initialize<F>(
        env: Rc<dyn Environment>,
        attributes: &FrameAttributes,
        on_ready: F,
    ) -> Result<FrameId>
    where
        F: FnOnce(Result<Bridge>) + 'static,
    {
        let loaded_env = Rc::clone(&env);
        let frame = env.create_frame(
            attributes,
            Box::new(move |frame| {
                let bridge = Bridge {
                    env: loaded_env,
                    frame,
                };
                let ready = bridge.mirror_page().map(|()| bridge);
                on_ready(ready);
            }),
        )?;
        debug!(frame = frame.0, id = %attributes.id, "auxiliary frame created");
        Ok(frame)
    }

    fn mirror_page(&self) -> Result<()> {
        let hash = codec::hash_of(&self.env.location());
        self.env.frame_open(self.frame)?;
        self.env.frame_close(self.frame)?;
        self.env.frame_set_hash(self.frame, &hash)?;
        debug!(frame = self.frame.0, hash = %hash, "auxiliary frame mirrors page");
        Ok(())
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    pub fn mirrored_fragment(&self) -> Result<String> {
        let href = self.env.frame_location(self.frame)?;
        Ok(codec::fragment_of(&href))
    }

    /// Records `target` as a new frame history entry unless it equals
    /// `previous`.
    pub fn set_mirrored_fragment(&self, target: &str, previous: &str) -> Result<()> {
        if target == previous {
            return Ok(());
        }
        self.env.frame_open(self.frame)?;
        self.env.frame_close(self.frame)?;
        self.env.frame_set_hash(self.frame, target)?;
        debug!(frame = self.frame.0, from = %previous, to = %target, "mirrored fragment updated");
        Ok(())
    }
}
