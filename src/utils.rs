use core::any::Any;

pub(crate) trait PanicMessage {
    /// Best-effort text of a panic payload.
    fn message(&self) -> &str;
}

impl PanicMessage for Box<dyn Any + Send> {
    fn message(&self) -> &str {
        if let Some(&message) = self.downcast_ref::<&'static str>() {
            message
        } else if let Some(message) = self.downcast_ref::<String>() {
            message.as_str()
        } else {
            "<non-string panic payload>"
        }
    }
}
