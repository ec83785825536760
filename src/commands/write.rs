// src/commands/write.rs

use super::{CommandError, CommandInput, ShireCommand};
use crate::core::session::Session;
use async_trait::async_trait;

/// `/write:path` followed by a code block: replaces the file with the block.
#[derive(Debug, Clone)]
pub struct WriteCommand {
    input: CommandInput,
}

impl WriteCommand {
    pub fn new(input: CommandInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl ShireCommand for WriteCommand {
    fn name(&self) -> &str {
        "write"
    }

    async fn execute(&self, session: &Session) -> Result<String, CommandError> {
        let content = self
            .input
            .code_block
            .as_deref()
            .ok_or_else(|| CommandError::MissingCodeBlock("write".to_string()))?;
        // A line range on the target is accepted but the whole file is replaced.
        let (path, _) = super::split_line_range(self.input.props.trim())?;

        let mut body = content.to_string();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        session.workspace.write(path, &body)?;
        log::info!("Wrote {} bytes to {}", body.len(), path);
        Ok(format!("Writing to file: {}", path))
    }
}
