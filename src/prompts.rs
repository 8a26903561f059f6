use crate::models::{EvaluationCase, TaskKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PERSONA_GENERATION_PROMPT: &str = r#"당신은 데이터 분석 전문가입니다.
입력된 사용자 프로필을 바탕으로 구조화된 페르소나 JSON 객체를 생성하세요.
단계 1: 사용자 프로필을 분석하여 선호도와 잠재적인 제약 사항(알러지 등)을 추론하세요 (CoT).
단계 2: 최종 JSON을 생성하세요.

모든 텍스트 값은 '한국어'로 작성해야 합니다.
오직 유효한 JSON 형식으로만 출력하세요:
{
    "reasoning": "string (분석 과정)",
    "name": "string",
    "gender": "string",
    "age_group": "string",
    "allergies": ["string"],
    "preferred_food_categories": ["string"],
    "preferred_ingredients": ["string"],
    "description": "string (페르소나 요약 설명)"
}"#;

const PERSONA_RATING_PROMPT: &str = r#"당신은 개인화된 맛집 추천 전문가입니다.
특정 식당이 사용자 페르소나와 얼마나 잘 맞는지 0점에서 10점 사이로 평가하세요.
음식 취향, 알러지(매우 중요), 예산을 고려하세요.
평가 점수에 대한 이유를 설명하세요.

모든 텍스트 값은 '한국어'로 작성해야 합니다.
출력 형식: {"score": float, "reason": "string (한국어)"}"#;

const MENU_RECOMMENDATION_PROMPT: &str = r#"당신은 전문 메뉴 플래너입니다.
참가자들의 프로필과 식당 메뉴를 바탕으로 단체 식사 메뉴를 제안하세요.
알러지가 있는 멤버를 위해 알러지 유발 재료가 없는지 반드시 확인하세요.
그룹의 선호도를 균형 있게 고려하세요.

모든 텍스트 값은 '한국어'로 작성해야 합니다.
출력 형식: {"menu_items": ["item1", "item2"], "total_price_estimate": int, "explanation": "string (한국어)"}"#;

/// Optional replacements for the built-in system prompts
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptOverrides {
    #[serde(default)]
    pub persona_generation: Option<String>,
    #[serde(default)]
    pub persona_rating: Option<String>,
    #[serde(default)]
    pub menu_recommendation: Option<String>,
}

/// Fixed instruction text per task kind
#[derive(Debug, Clone)]
pub struct SystemPrompts {
    persona_generation: String,
    persona_rating: String,
    menu_recommendation: String,
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self::with_overrides(&PromptOverrides::default())
    }
}

impl SystemPrompts {
    pub fn with_overrides(overrides: &PromptOverrides) -> Self {
        let pick = |custom: &Option<String>, fallback: &str| {
            custom.clone().unwrap_or_else(|| fallback.to_string())
        };
        Self {
            persona_generation: pick(&overrides.persona_generation, PERSONA_GENERATION_PROMPT),
            persona_rating: pick(&overrides.persona_rating, PERSONA_RATING_PROMPT),
            menu_recommendation: pick(&overrides.menu_recommendation, MENU_RECOMMENDATION_PROMPT),
        }
    }

    pub fn for_task(&self, kind: TaskKind) -> &str {
        match kind {
            TaskKind::PersonaGeneration => &self.persona_generation,
            TaskKind::PersonaRating => &self.persona_rating,
            TaskKind::MenuRecommendation => &self.menu_recommendation,
        }
    }
}

/// Render the user turn for a case. Non-ASCII text is kept verbatim.
pub fn build_user_prompt(case: &EvaluationCase) -> String {
    let payload = &case.payload;
    match case.task_kind {
        TaskKind::PersonaGeneration => format!("User Data: {}", payload),
        TaskKind::PersonaRating => format!(
            "Persona: {}\nRestaurant: {}",
            section(payload, "persona"),
            section(payload, "restaurant")
        ),
        TaskKind::MenuRecommendation => format!(
            "Group: {}\nRestaurant: {}\nEvent: {}",
            section(payload, "group"),
            section(payload, "restaurant"),
            section(payload, "event")
        ),
    }
}

fn section(payload: &Value, key: &str) -> String {
    payload.get(key).unwrap_or(&Value::Null).to_string()
}
