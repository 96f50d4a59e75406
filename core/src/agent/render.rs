/// Where the turn engine shows its progress. The engine decides when a
/// section starts; implementations decide what it looks like.
pub trait Renderer: Send {
    fn reasoning_header(&mut self);

    fn reasoning(&mut self, text: &str);

    fn answer_header(&mut self);

    fn answer(&mut self, text: &str);

    fn tool_call(&mut self, name: &str, arguments: &str);

    fn tool_result(&mut self, content: &str);

    /// Called once the turn's final stream has closed.
    fn finish(&mut self) {}
}
