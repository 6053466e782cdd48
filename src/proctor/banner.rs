use std::time::Duration;

use uuid::Uuid;

/// A transient, auto-dismissing proctoring notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub id: Uuid,
    pub message: String,
    pub raised_at_ms: i64,
}

pub struct BannerQueue {
    banners: Vec<Banner>,
    autohide_ms: i64,
}

impl BannerQueue {
    pub fn new(autohide: Duration) -> Self {
        Self {
            banners: Vec::new(),
            autohide_ms: autohide.as_millis() as i64,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, now_ms: i64) {
        self.banners.push(Banner {
            id: Uuid::new_v4(),
            message: message.into(),
            raised_at_ms: now_ms,
        });
    }

    /// Drops banners older than the auto-hide window.
    pub fn sweep(&mut self, now_ms: i64) {
        let autohide = self.autohide_ms;
        self.banners
            .retain(|b| now_ms - b.raised_at_ms < autohide);
    }

    pub fn dismiss(&mut self, id: Uuid) {
        self.banners.retain(|b| b.id != id);
    }

    pub fn active(&self) -> &[Banner] {
        &self.banners
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_expires_old_banners() {
        let mut q = BannerQueue::new(Duration::from_millis(3500));
        q.push("first", 0);
        q.push("second", 2_000);
        q.sweep(3_500);
        assert_eq!(q.active().len(), 1);
        assert_eq!(q.active()[0].message, "second");

        q.sweep(5_500);
        assert!(q.active().is_empty());
    }

    #[test]
    fn dismiss_removes_by_id() {
        let mut q = BannerQueue::new(Duration::from_millis(3500));
        q.push("one", 0);
        q.push("two", 0);
        let id = q.active()[0].id;
        q.dismiss(id);
        assert_eq!(q.active().len(), 1);
        assert_eq!(q.active()[0].message, "two");
    }
}
