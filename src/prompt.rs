//! Deterministic prompt composition.
//!
//! A pure function of the question and the ranked retrieval results — no
//! I/O, no hidden state. Two templates, selected solely by whether the
//! chunk list is empty:
//!
//! - **grounded**: one labeled section per chunk (1-based ordinal, owning
//!   filename, subject in parentheses when present, similarity to two
//!   decimals, then the raw chunk text), in the ranked order received,
//!   followed by the verbatim question and the fixed instructional footer.
//! - **ungrounded**: question plus footer only, no resource section. Used
//!   when retrieval was skipped or returned nothing.
//!
//! Both templates mandate the same output contract to the generation
//! backend: inline math in `$…$`, block math in `$$…$$`, step-by-step
//! explanation. The composer never re-ranks.

use crate::models::RetrievedChunk;

/// Fixed system instruction sent alongside every composed prompt.
pub const SYSTEM_INSTRUCTION: &str = "あなたは理系大学の学習支援AIアシスタントです。
数学・物理などの問題に対して、正確でわかりやすい解答を提供してください。
数式はLaTeX記法で記述し、論理的に段階を追って説明してください。";

/// Build the generation prompt for a question and its ranked chunks.
pub fn compose(question: &str, ranked_chunks: &[RetrievedChunk]) -> String {
    if ranked_chunks.is_empty() {
        return compose_ungrounded(question);
    }

    let mut context_parts = Vec::with_capacity(ranked_chunks.len());
    for (i, chunk) in ranked_chunks.iter().enumerate() {
        let subject_str = chunk
            .subject
            .as_deref()
            .map(|s| format!("（{}）", s))
            .unwrap_or_default();

        context_parts.push(format!(
            "## 資料{}: {}{}\n関連度: {:.2}\n\n{}\n",
            i + 1,
            chunk.filename,
            subject_str,
            chunk.similarity,
            chunk.content
        ));
    }

    let context = context_parts.join("\n");

    format!(
        "以下の授業資料を参考に、学生の質問に丁寧に解答してください。

# 参考資料
{context}

# 学生の質問
{question}

# 解答
数式は必ずLaTeX記法を使用し、インライン数式は $...$ で、ブロック数式は $$...$$ で囲んでください。
ステップバイステップで丁寧に説明し、必要に応じて図や具体例を用いてください。
参考資料の内容を適切に引用しながら、理解しやすい解答を心がけてください。"
    )
}

fn compose_ungrounded(question: &str) -> String {
    format!(
        "以下の学生の質問に、あなたの知識を使って丁寧に解答してください。

# 学生の質問
{question}

# 解答
数式は必ずLaTeX記法を使用し、インライン数式は $...$ で、ブロック数式は $$...$$ で囲んでください。
ステップバイステップで丁寧に説明し、必要に応じて図や具体例を用いてください。"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(filename: &str, subject: Option<&str>, content: &str, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            filename: filename.to_string(),
            subject: subject.map(|s| s.to_string()),
            content: content.to_string(),
            similarity,
        }
    }

    #[test]
    fn test_grounded_sections_numbered_from_one() {
        let chunks = vec![
            chunk("a.pdf", None, "first", 0.9),
            chunk("b.pdf", None, "second", 0.8),
            chunk("c.pdf", None, "third", 0.7),
        ];
        let prompt = compose("質問です", &chunks);

        assert!(prompt.contains("## 資料1: a.pdf"));
        assert!(prompt.contains("## 資料2: b.pdf"));
        assert!(prompt.contains("## 資料3: c.pdf"));
        assert!(!prompt.contains("## 資料4:"));
        assert_eq!(prompt.matches("## 資料").count(), 3);
        // Sections appear in the ranked order received.
        let p1 = prompt.find("## 資料1").unwrap();
        let p2 = prompt.find("## 資料2").unwrap();
        let p3 = prompt.find("## 資料3").unwrap();
        assert!(p1 < p2 && p2 < p3);
    }

    #[test]
    fn test_question_appears_verbatim_once() {
        let chunks = vec![chunk("a.pdf", None, "text", 0.5)];
        let question = "微分の連鎖律を教えて";
        let prompt = compose(question, &chunks);
        assert_eq!(prompt.matches(question).count(), 1);
    }

    #[test]
    fn test_subject_rendered_in_parentheses() {
        let chunks = vec![chunk("calculus.pdf", Some("数学"), "微分", 0.81)];
        let prompt = compose("q", &chunks);
        assert!(prompt.contains("## 資料1: calculus.pdf（数学）"));
        assert!(prompt.contains("関連度: 0.81"));
    }

    #[test]
    fn test_missing_subject_omits_parentheses() {
        let chunks = vec![chunk("notes.pdf", None, "text", 0.5)];
        let prompt = compose("q", &chunks);
        assert!(prompt.contains("## 資料1: notes.pdf\n"));
        assert!(!prompt.contains("（"));
    }

    #[test]
    fn test_similarity_two_decimal_places() {
        let chunks = vec![chunk("a.pdf", None, "x", 0.816_6)];
        let prompt = compose("q", &chunks);
        assert!(prompt.contains("関連度: 0.82"));
    }

    #[test]
    fn test_empty_chunks_uses_ungrounded_template() {
        let prompt = compose("熱力学第二法則とは？", &[]);
        assert!(!prompt.contains("# 参考資料"));
        assert!(!prompt.contains("## 資料"));
        assert!(prompt.contains("熱力学第二法則とは？"));
        assert!(prompt.contains("あなたの知識を使って"));
    }

    #[test]
    fn test_both_templates_carry_math_contract() {
        let grounded = compose("q", &[chunk("a.pdf", None, "x", 0.5)]);
        let ungrounded = compose("q", &[]);
        for p in [&grounded, &ungrounded] {
            assert!(p.contains("$...$"));
            assert!(p.contains("$$...$$"));
            assert!(p.contains("ステップバイステップ"));
        }
    }

    #[test]
    fn test_compose_is_idempotent() {
        let chunks = vec![
            chunk("a.pdf", Some("数学"), "内容A", 0.91),
            chunk("b.pdf", None, "内容B", 0.42),
        ];
        let first = compose("同じ質問", &chunks);
        let second = compose("同じ質問", &chunks);
        assert_eq!(first, second);
    }
}
