//! Prompt templates for question answering.

use litrag_ingestion::chunker::word_count;

use crate::llm::{truncate_words, word_limit};

/// Returned instead of an answer when nothing has been indexed yet.
pub const NO_CORPUS_MESSAGE: &str = "Please search for papers first before asking questions.";

/// Question-answering prompt over assembled paper excerpts.
///
/// With `max_input_tokens`, only the excerpts are shortened (from the end) so
/// the instructions and the question always reach the model.
pub fn build_answer_prompt(context: &str, question: &str, max_input_tokens: Option<usize>) -> String {
    let Some(limit) = max_input_tokens else {
        return render(context, question);
    };
    let frame_words = word_count(&render("", question));
    let context_words = word_limit(limit).saturating_sub(frame_words);
    render(truncate_words(context, context_words), question)
}

fn render(context: &str, question: &str) -> String {
    format!(
        "Answer the following question based on these research paper excerpts. \
         Include citations to the papers when referencing specific information.\n\n\
         Research paper excerpts:\n{context}\n\n\
         Question: {question}\n\n\
         Answer: "
    )
}
