//! Prompt texts sent to the vision model

use crate::job::RequestKind;

const OUTFIT_SYSTEM: &str = "You are a fashion stylist. You look at photos of individual clothing \
items and write a detailed image-generation prompt for a photorealistic, full-body picture of a \
model wearing all of the items together as one coherent outfit. Describe every garment's colour, \
material, cut and how it is worn. Reply with the prompt only.";

const OUTFIT_USER: &str = "Combine the clothing items in these photos into a single stylish \
outfit and describe it as an image-generation prompt.";

const MATCHING_SYSTEM: &str = "You are a fashion stylist. You look at a photo of one clothing \
item and design a complete outfit around it, choosing the remaining garments, shoes and \
accessories. Write a detailed image-generation prompt for a photorealistic, full-body picture of \
a model wearing the outfit, keeping the original item clearly recognisable. Reply with the prompt \
only.";

const MATCHING_USER: &str = "Build a complete outfit around the clothing item in this photo and \
describe it as an image-generation prompt.";

/// System and user prompt pair for each request kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub outfit_system: String,
    pub outfit_user: String,
    pub matching_system: String,
    pub matching_user: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            outfit_system: OUTFIT_SYSTEM.to_string(),
            outfit_user: OUTFIT_USER.to_string(),
            matching_system: MATCHING_SYSTEM.to_string(),
            matching_user: MATCHING_USER.to_string(),
        }
    }
}

impl Prompts {
    /// `(system, user)` prompts for a request kind
    pub fn for_kind(&self, kind: RequestKind) -> (&str, &str) {
        match kind {
            RequestKind::CombineOutfit => (&self.outfit_system, &self.outfit_user),
            RequestKind::MatchOutfit => (&self.matching_system, &self.matching_user),
        }
    }
}
