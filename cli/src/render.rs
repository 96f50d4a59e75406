use chatloop_core::{Renderer, UsageTotals};
use console::style;
use std::io::Write;

const SEPARATOR: &str = "────";

/// Terminal output for the chat loop. Write failures are ignored: a closed
/// stdout must not abort a turn that is already mutating the transcript.
pub struct ConsoleRenderer<W> {
    out: W,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn user_prompt(&mut self) {
        let _ = write!(self.out, "{} ", style("You>").green());
        let _ = self.out.flush();
    }

    pub fn agent_prompt(&mut self) {
        let _ = write!(self.out, "\n{} ", style("Agent>").cyan());
        let _ = self.out.flush();
    }

    pub fn usage(&mut self, usage: &UsageTotals) {
        let _ = writeln!(self.out);
        self.section("Usage", |s| style(s).dim().to_string());
        let _ = writeln!(
            self.out,
            "{}\n{}\n{}\n",
            style(format!("Completion_Tokens: {}", usage.completion_tokens)).yellow(),
            style(format!("Prompt_Tokens: {}", usage.prompt_tokens)).magenta(),
            style(format!("Total_Tokens: {}", usage.total_tokens)).blue(),
        );
        let _ = self.out.flush();
    }

    pub fn error(&mut self, err: &anyhow::Error) {
        let _ = writeln!(self.out, "\n{}", style(format!("{:#}", err)).red().bright());
        let _ = self.out.flush();
    }

    pub fn goodbye(&mut self) {
        let _ = writeln!(self.out, "\n{}", style("bye").dim());
        let _ = self.out.flush();
    }

    pub fn interrupted(&mut self) {
        let _ = writeln!(self.out, "\n{}", style("interrupted").red().bright());
        let _ = self.out.flush();
    }

    fn section(&mut self, title: &str, paint: impl Fn(String) -> String) {
        let line = format!("{SEPARATOR} {title} {SEPARATOR}");
        let _ = writeln!(self.out, "{}", paint(line));
    }
}

impl<W: Write + Send> Renderer for ConsoleRenderer<W> {
    fn reasoning_header(&mut self) {
        let _ = writeln!(self.out);
        self.section("Reasoning", |s| style(s).magenta().to_string());
    }

    fn reasoning(&mut self, text: &str) {
        let _ = write!(self.out, "{}", style(text).dim());
        let _ = self.out.flush();
    }

    fn answer_header(&mut self) {
        let _ = writeln!(self.out, "\n");
        self.section("Answer", |s| style(s).cyan().to_string());
    }

    fn answer(&mut self, text: &str) {
        let _ = write!(self.out, "{}", text);
        let _ = self.out.flush();
    }

    fn tool_call(&mut self, name: &str, arguments: &str) {
        let _ = writeln!(
            self.out,
            "\n{} {}({})",
            style("[Tool Call]").yellow(),
            style(name).cyan(),
            style(arguments).dim()
        );
    }

    fn tool_result(&mut self, content: &str) {
        let _ = writeln!(
            self.out,
            "{} {}",
            style("[Tool Result]").yellow(),
            style(content).dim()
        );
        let _ = self.out.flush();
    }

    fn finish(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(renderer: &ConsoleRenderer<Vec<u8>>) -> String {
        console::strip_ansi_codes(&String::from_utf8_lossy(renderer.get_ref())).into_owned()
    }

    #[test]
    fn sections_and_trace_lines() {
        let mut renderer = ConsoleRenderer::new(Vec::new());
        renderer.reasoning_header();
        renderer.reasoning("thinking");
        renderer.tool_call("get_current_weather", r#"{"location":"Paris"}"#);
        renderer.tool_result(r#"{"status":"SUCCESS","data":{}}"#);
        renderer.answer_header();
        renderer.answer("It's warm.");
        renderer.finish();

        let text = output(&renderer);
        assert!(text.contains("──── Reasoning ────"));
        assert!(text.contains(r#"[Tool Call] get_current_weather({"location":"Paris"})"#));
        assert!(text.contains(r#"[Tool Result] {"status":"SUCCESS","data":{}}"#));
        assert!(text.contains("──── Answer ────\nIt's warm.\n"));
    }

    #[test]
    fn usage_summary() {
        let mut renderer = ConsoleRenderer::new(Vec::new());
        let usage = UsageTotals {
            completion_tokens: 6,
            prompt_tokens: 30,
            total_tokens: 13,
            ..UsageTotals::default()
        };
        renderer.usage(&usage);

        let text = output(&renderer);
        assert!(text.contains("──── Usage ────"));
        assert!(text.contains("Completion_Tokens: 6\nPrompt_Tokens: 30\nTotal_Tokens: 13"));
    }
}
