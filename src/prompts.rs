//! Prompt templates for variant generation and judging.
//!
//! Placeholders are filled by `fill_template`, a single pass over the template
//! text. Substituted values are never scanned again, so user content containing
//! braces or `{question}`-like text is inserted verbatim.

use crate::models::BaseExample;

/// Asks for a confident, fabricated one-sentence answer.
pub const HALLUCINATION_TEMPLATE: &str = r#"You are a helpful hallucinating assistant, who makes up fake answers to questions.

Answer the following question in 1 sentence. If you know the answer, then make up some fake
superfluous details that are not in the passage you have memorized.

Make sure to always answer it confidently, even if you don't know the answer. Do not use words
like "perhaps", "likely", "maybe", etc. or punctuation like "...". Do not admit that you cannot
or do not know the answer.

Context: {context}
Question: {question}"#;

/// System instruction for the partially-correct answer.
pub const PARTIAL_SYSTEM_PROMPT: &str = "Create a partial but accurate answer to the question. \
Include only some of the correct information, but do not add any incorrect information.";

/// Judge instructions with the A-E factuality taxonomy.
pub const JUDGE_TEMPLATE: &str = r#"You are comparing a submitted answer to an expert answer on a given question. Here is the data:
[BEGIN DATA]
************
[Context]: {context}
************
[Question]: {question}
************
[Expert]: {correctAnswer}
************
[Submission]: {generatedAnswer}
************
[END DATA]

Compare the factual content of the submitted answer with the expert answer. Ignore any differences in style, grammar, or punctuation.
The submitted answer may either be a subset or superset of the expert answer, or it may conflict with it. Determine which case applies. Answer the question by selecting one of the following options:
(A) The submitted answer is a subset of the expert answer and is fully consistent with it.
(B) The submitted answer is a superset of the expert answer and is fully consistent with it.
(C) The submitted answer contains all the same details as the expert answer.
(D) There is a disagreement between the submitted answer and the expert answer.
(E) The answers differ, but these differences don't matter from the perspective of factuality.

Provide your reasoning in a step-by-step manner and then select a single choice from A, B, C, D, or E.
Format your response exactly as follows:

Reasoning: <your step by step reasoning>
Choice: <single letter A-E>"#;

/// Substitute `{name}` placeholders in `template`.
///
/// Each named placeholder is replaced at its first occurrence only. Unknown
/// placeholders and any other braces are kept as-is.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let extra: usize = values.iter().map(|(_, v)| v.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut used = vec![false; values.len()];
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        let hit = values.iter().enumerate().find(|(i, (name, _))| {
            !used[*i]
                && rest[1..]
                    .strip_prefix(*name)
                    .is_some_and(|tail| tail.starts_with('}'))
        });

        match hit {
            Some((i, (name, value))) => {
                out.push_str(value);
                used[i] = true;
                rest = &rest[name.len() + 2..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// User prompt eliciting a hallucinated answer.
pub fn hallucination_prompt(example: &BaseExample) -> String {
    fill_template(
        HALLUCINATION_TEMPLATE,
        &[
            ("context", &example.context),
            ("question", &example.question),
        ],
    )
}

/// User prompt for the partial answer; pairs with `PARTIAL_SYSTEM_PROMPT`.
pub fn partial_prompt(example: &BaseExample) -> String {
    format!(
        "Context: {}\nQuestion: {}\nFull Answer: {}",
        example.context, example.question, example.correct_answer
    )
}

/// User prompt asking the judge to classify `submission` against `expert`.
pub fn judge_prompt(context: &str, question: &str, expert: &str, submission: &str) -> String {
    fill_template(
        JUDGE_TEMPLATE,
        &[
            ("context", context),
            ("question", question),
            ("correctAnswer", expert),
            ("generatedAnswer", submission),
        ],
    )
}
