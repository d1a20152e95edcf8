// src/messages.rs

/// Which end of the message bar a message is shown on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Handle to a message registered with a [`MessageBox`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageId(usize);

#[derive(Debug, Clone)]
pub struct Message {
    pub content: String,
    /// Ticks a post stays visible: 0 expires on the next tick, negative never expires
    pub ticks: i32,
}

#[derive(Debug, Clone, Copy)]
struct Posted {
    id: MessageId,
    ticks_left: i32,
}

/// Two slots of expiring status messages, newest first within each slot.
#[derive(Debug, Default)]
pub struct MessageBox {
    messages: Vec<Message>,
    left: Vec<Posted>,
    right: Vec<Posted>,
}

impl MessageBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, content: impl Into<String>, ticks: i32) -> MessageId {
        self.messages.push(Message {
            content: content.into(),
            ticks,
        });
        MessageId(self.messages.len() - 1)
    }

    pub fn message_mut(&mut self, id: MessageId) -> &mut Message {
        &mut self.messages[id.0]
    }

    /// Shows `id` on `side`, moving it there if it is already shown anywhere and restarting its
    /// countdown.
    pub fn post(&mut self, id: MessageId, side: Side) {
        self.left.retain(|p| p.id != id);
        self.right.retain(|p| p.id != id);
        let posted = Posted {
            id,
            ticks_left: self.messages[id.0].ticks,
        };
        self.slot_mut(side).insert(0, posted);
    }

    /// Sets the content of `id` and posts it.
    pub fn show(&mut self, id: MessageId, content: impl Into<String>, side: Side) {
        self.message_mut(id).content = content.into();
        self.post(id, side);
    }

    /// Counts every shown message down by one tick and drops the expired ones.
    ///
    /// Returns whether anything disappeared.
    pub fn tick(&mut self) -> bool {
        let left = tick_slot(&mut self.left);
        let right = tick_slot(&mut self.right);
        left || right
    }

    /// Contents shown on `side`, joined for display
    pub fn text(&self, side: Side) -> String {
        self.slot(side)
            .iter()
            .map(|p| self.messages[p.id.0].content.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[cfg(test)]
    pub fn is_shown(&self, id: MessageId, side: Side) -> bool {
        self.slot(side).iter().any(|p| p.id == id)
    }

    fn slot(&self, side: Side) -> &Vec<Posted> {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn slot_mut(&mut self, side: Side) -> &mut Vec<Posted> {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

fn tick_slot(slot: &mut Vec<Posted>) -> bool {
    let before = slot.len();
    for posted in slot.iter_mut() {
        if posted.ticks_left > 0 {
            posted.ticks_left -= 1;
        }
    }
    slot.retain(|p| p.ticks_left != 0);
    slot.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reposting_moves_between_sides() {
        let mut mb = MessageBox::new();
        let saved = mb.register("saved", 5);
        mb.post(saved, Side::Left);
        mb.post(saved, Side::Right);

        assert!(!mb.is_shown(saved, Side::Left));
        assert!(mb.is_shown(saved, Side::Right));
        assert_eq!(mb.text(Side::Left), "");
        assert_eq!(mb.text(Side::Right), "saved");
    }

    #[test]
    fn newest_first_and_no_duplicates() {
        let mut mb = MessageBox::new();
        let a = mb.register("a", 5);
        let b = mb.register("b", 5);
        mb.post(a, Side::Left);
        mb.post(b, Side::Left);
        assert_eq!(mb.text(Side::Left), "b, a");

        mb.post(a, Side::Left);
        assert_eq!(mb.text(Side::Left), "a, b");
    }

    #[test]
    fn messages_expire_after_their_ticks() {
        let mut mb = MessageBox::new();
        let status = mb.register("status", 2);
        mb.post(status, Side::Left);

        assert!(!mb.tick());
        assert_eq!(mb.text(Side::Left), "status");
        assert!(mb.tick());
        assert_eq!(mb.text(Side::Left), "");
        assert!(!mb.tick());
    }

    #[test]
    fn zero_ticks_expire_on_next_tick() {
        let mut mb = MessageBox::new();
        let flash = mb.register("flash", 0);
        mb.post(flash, Side::Right);
        assert_eq!(mb.text(Side::Right), "flash");
        assert!(mb.tick());
        assert_eq!(mb.text(Side::Right), "");
    }

    #[test]
    fn negative_ticks_persist() {
        let mut mb = MessageBox::new();
        let usage = mb.register("j/k scroll", -1);
        mb.post(usage, Side::Right);
        for _ in 0..100 {
            assert!(!mb.tick());
        }
        assert_eq!(mb.text(Side::Right), "j/k scroll");
    }

    #[test]
    fn reposting_restarts_the_countdown() {
        let mut mb = MessageBox::new();
        let status = mb.register("one", 2);
        mb.post(status, Side::Left);
        mb.tick();
        mb.show(status, "two", Side::Left);
        assert!(!mb.tick());
        assert_eq!(mb.text(Side::Left), "two");
        assert!(mb.tick());
    }

    #[test]
    fn sides_tick_independently() {
        let mut mb = MessageBox::new();
        let short = mb.register("short", 1);
        let long = mb.register("long", 3);
        mb.post(short, Side::Left);
        mb.post(long, Side::Right);

        assert!(mb.tick());
        assert_eq!(mb.text(Side::Left), "");
        assert_eq!(mb.text(Side::Right), "long");
    }
}
