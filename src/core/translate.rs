//! Markdown → Chinese Markdown stage.
//!
//! One backend call per document, the whole file in a single prompt.

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::{info, instrument, warn};

use super::workspace::WorkspaceManager;
use crate::adapters::{CompletionBackend, CompletionRequest};
use crate::domain::session::TRANSLATED_DIR;
use crate::domain::{Session, TranslationResult};
use crate::error::TranslationError;

/// Prefix of the translated file name
pub const TRANSLATED_PREFIX: &str = "zh_";

/// Sampling temperature for translation requests
pub const TEMPERATURE: f32 = 0.1;

/// System prompt establishing the translator role
pub const SYSTEM_PROMPT: &str = "你是一个专业的翻译助手，可以将英文精确翻译为中文。";

const PROMPT_RULES: &str = "请将以下英文Markdown文档翻译成中文，必须遵循以下规则：

整理为标准的markdown语法，将内容翻译为流利的中文（好理解的主谓宾顺序，汉语习惯，可适当拆分原文的长句，或变换句式）。
一些惯用术语可保留英语，首次出现的英文缩写需要用括号说明。
图和表格的标题也要翻译（嵌入引用位置附近），表格整理为标准的markdown语法或简洁的html语法。
图表的链接保持原样。所有公式（$行内公式$、$$行间公式$$）使用标准的LaTeX语法。
返回翻译后的完整Markdown内容！不要遗漏！也不要增加原文没有的内容！不要包裹一层```markdown```

待翻译内容：";

/// User prompt wrapping `content` verbatim in a markdown fence
pub fn build_prompt(content: &str) -> String {
    format!("{}\n\n```markdown\n{}\n```", PROMPT_RULES, content)
}

/// File name of the translation of `markdown_path`
pub fn translated_file_name(markdown_path: &Path) -> String {
    let name = markdown_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.md".to_string());
    format!("{}{}", TRANSLATED_PREFIX, name)
}

/// Translates a Markdown file through a [`CompletionBackend`]
pub struct TranslationStage {
    backend: Arc<dyn CompletionBackend>,
    workspace: WorkspaceManager,
}

impl TranslationStage {
    pub fn new(backend: Arc<dyn CompletionBackend>, workspace: WorkspaceManager) -> Self {
        Self { backend, workspace }
    }

    /// Translate `markdown_path` into `<session>/translated/zh_<name>`.
    ///
    /// Nothing is written unless the backend returns non-blank text.
    #[instrument(skip(self, session), fields(session_id = %session.id, backend = self.backend.name()))]
    pub async fn translate(
        &self,
        markdown_path: &Path,
        session: &Session,
    ) -> Result<TranslationResult, TranslationError> {
        let content =
            fs::read_to_string(markdown_path)
                .await
                .map_err(|source| TranslationError::Read {
                    path: markdown_path.to_path_buf(),
                    source,
                })?;
        info!(chars = content.chars().count(), "Read source markdown");

        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(&content),
            temperature: TEMPERATURE,
        };

        let translated = match self.backend.complete(&request).await? {
            Some(text) if !text.trim().is_empty() => text,
            _ => {
                warn!("Backend returned no usable content");
                return Err(TranslationError::EmptyResponse);
            }
        };

        let dir = self.workspace.resolve_subpath(session, TRANSLATED_DIR).await?;
        let translated_path = dir.join(translated_file_name(markdown_path));

        fs::write(&translated_path, &translated)
            .await
            .map_err(|source| TranslationError::Write {
                path: translated_path.clone(),
                source,
            })?;

        let char_count = translated.chars().count();
        info!(
            output = %translated_path.display(),
            chars = char_count,
            "Translation saved"
        );

        Ok(TranslationResult {
            translated_path,
            char_count,
        })
    }
}
