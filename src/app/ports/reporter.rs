/// Line-oriented diagnostic output of tasks.
pub trait Reporter: Send + Sync {
    fn line(&self, text: &str);
}
