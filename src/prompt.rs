/// Fixed RAG prompt. The leading newline is part of the template.
pub const RAG_TEMPLATE: &str = "
You are a medical assistant for question-answering tasks. Use the following pieces of retrieved context to answer the question. If you don't know the answer, just say that you don't know. Use three sentences maximum and keep the answer concise.

<context>
{context}
</context>

Answer the following question:

{question}";

/// Bind the context block and the raw question into the template.
///
/// Substitution is a single pass, so braces inside the context or question are left alone.
pub fn render_prompt(context: &str, question: &str) -> String {
    let mut rendered = String::with_capacity(RAG_TEMPLATE.len() + context.len() + question.len());
    let mut rest = RAG_TEMPLATE;

    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            rendered.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            rendered.push_str(question);
            rest = after;
        } else {
            rendered.push('{');
            rest = &tail[1..];
        }
    }
    rendered.push_str(rest);
    rendered
}
