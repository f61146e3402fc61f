//! System prompt assembly.
//!
//! The system message is the expert-agent persona, followed by the answer
//! guidelines and the grounding block built from the retrieved chunks.

use crate::index::ScoredChunk;

/// Persona and method for the insurance expert.
pub const AGENT_INSTRUCTIONS: &str = "\
You are an expert insurance agent specializing in analyzing and recommending insurance plans. \
You have access to a vector database containing detailed insurance plan information.

ANALYSIS PROCESS:
1. RETRIEVAL:
   - Carefully review all insurance plans retrieved from the vector database
   - Pay attention to the relevance scores of retrieved results
   - Focus on the most relevant matches while considering secondary matches for comprehensive analysis

2. AUGMENTATION:
   - Combine the retrieved information with your insurance expertise
   - Cross-reference different plans to identify patterns and unique features
   - Consider how different plan features complement or compete with each other

3. GENERATION:
   When formulating your response:
   a) Start with the most relevant retrieved plans
   b) Structure your analysis around:
      - Primary coverage features
      - Cost considerations
      - Unique benefits
      - Potential limitations
      - Compatibility with user needs
   c) Synthesize insights across multiple plans
   d) Provide clear comparisons and contrasts

4. RESPONSE FORMAT:
   a) Retrieved Plans Analysis:
      - List key plans found in vector database
      - Highlight relevance and match quality
      - Note any potential information gaps

   b) Comparative Analysis:
      - Coverage comparison
      - Cost-benefit analysis
      - Risk assessment
      - Special considerations

   c) Recommendations:
      - Primary recommendation with rationale
      - Alternative options
      - Important caveats or conditions

5. QUALITY CHECKS:
   - Verify all cited information comes from retrieved data
   - Clearly distinguish between retrieved facts and expert analysis
   - Acknowledge any information gaps or uncertainties
   - Maintain objectivity in analysis

Remember:
- Only use information actually present in the retrieved results
- Clearly indicate when making assumptions or generalizations
- Use simple, clear language to explain complex terms
- Be transparent about confidence levels in recommendations
- Request additional information if crucial details are missing";

/// Per-request guidelines preceding the retrieved documents.
pub const ANSWER_GUIDELINES: &str = "\
You are an AI insurance expert. Please analyze the following insurance documents and answer the user's question.
Important guidelines:
1. Only use information from the provided documents without citing document numbers in parentheses \
(e.g., avoid formats like \"（文件1）\" or \"(Document 1)\")
2. If the information isn't in the documents, acknowledge the limitation
3. Cite specific sections when possible
4. Focus on accuracy and relevance";

const RULE: &str = "----------------------------";

/// Concatenate retrieved chunks in rank order as `[Document i]:` entries
/// separated by blank lines.
pub fn grounding_block(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[Document {}]:\n{}\n", i + 1, hit.chunk.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full system message for one question.
pub fn system_prompt(hits: &[ScoredChunk]) -> String {
    format!(
        "{}\n\n{}\n\nRetrieved insurance documents:\n{}\n{}\n{}",
        AGENT_INSTRUCTIONS,
        ANSWER_GUIDELINES,
        RULE,
        grounding_block(hits),
        RULE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};

    fn hit(text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "id".into(),
                chunk_index: 0,
                text: text.into(),
                hash: String::new(),
                start_char: 0,
                end_char: 0,
                hard_cut: false,
                metadata: ChunkMetadata {
                    source: "plan".into(),
                    language: "zh-CN".into(),
                    chunk_type: "insurance_policy".into(),
                    page: 1,
                },
            },
            score,
        }
    }

    #[test]
    fn grounding_block_labels_in_rank_order() {
        let block = grounding_block(&[hit("保费每年缴付。", 0.9), hit("保单年期为十年。", 0.8)]);
        assert_eq!(
            block,
            "[Document 1]:\n保费每年缴付。\n\n[Document 2]:\n保单年期为十年。\n"
        );
    }

    #[test]
    fn grounding_block_empty_for_no_hits() {
        assert_eq!(grounding_block(&[]), "");
    }

    #[test]
    fn system_prompt_has_persona_guidelines_and_context() {
        let prompt = system_prompt(&[hit("身故赔偿为已缴保费的101%。", 0.7)]);
        assert!(prompt.starts_with("You are an expert insurance agent"));
        assert!(prompt.contains("QUALITY CHECKS"));
        assert!(prompt.contains("acknowledge the limitation"));
        assert!(prompt.contains("Retrieved insurance documents:"));
        assert!(prompt.contains("[Document 1]:\n身故赔偿为已缴保费的101%。"));
        assert!(prompt.trim_end().ends_with(RULE));
    }
}
