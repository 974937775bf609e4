/// Shared message dialog id.
pub const MESSAGE_MODAL: &str = "modal-mensaje";

/// Visible overlays by id. There is no stack: any number may be open together.
#[derive(Debug, Default)]
pub struct ModalManager {
    visible: Vec<String>,
}

impl ModalManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, id: &str) {
        if !self.is_open(id) {
            self.visible.push(id.to_string());
        }
    }

    pub fn close(&mut self, id: &str) -> bool {
        let before = self.visible.len();
        self.visible.retain(|v| v != id);
        before != self.visible.len()
    }

    /// A click on a modal's overlay. Clicks inside the content never close it.
    pub fn backdrop_click(&mut self, id: &str, on_backdrop: bool) -> bool {
        if !on_backdrop {
            return false;
        }
        self.close(id)
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.visible.iter().any(|v| v == id)
    }

    pub fn visible(&self) -> &[String] {
        &self.visible
    }

    pub fn close_all(&mut self) {
        self.visible.clear();
    }
}
