use crate::models::{EvaluationCase, TaskKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;

/// The three case tables, one per task kind
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSuite {
    pub persona: Vec<EvaluationCase>,
    pub rating: Vec<EvaluationCase>,
    pub menu: Vec<EvaluationCase>,
}

/// On-disk shape of a case table entry; the task kind comes from the table
#[derive(Debug, Deserialize)]
struct CaseEntry {
    id: String,
    #[serde(default)]
    tag: String,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct CaseFile {
    #[serde(default)]
    persona: Vec<CaseEntry>,
    #[serde(default)]
    rating: Vec<CaseEntry>,
    #[serde(default)]
    menu: Vec<CaseEntry>,
}

impl CaseSuite {
    pub fn for_task(&self, kind: TaskKind) -> &[EvaluationCase] {
        match kind {
            TaskKind::PersonaGeneration => &self.persona,
            TaskKind::PersonaRating => &self.rating,
            TaskKind::MenuRecommendation => &self.menu,
        }
    }

    /// Load case tables from a JSON file with `persona`, `rating` and `menu` arrays
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read case file: {}", path.display()))?;
        let file: CaseFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse case file: {}", path.display()))?;

        let convert = |kind: TaskKind, entries: Vec<CaseEntry>| -> Vec<EvaluationCase> {
            entries
                .into_iter()
                .map(|entry| EvaluationCase {
                    id: entry.id,
                    task_kind: kind,
                    tag: entry.tag,
                    payload: entry.payload,
                })
                .collect()
        };

        Ok(Self {
            persona: convert(TaskKind::PersonaGeneration, file.persona),
            rating: convert(TaskKind::PersonaRating, file.rating),
            menu: convert(TaskKind::MenuRecommendation, file.menu),
        })
    }

    /// Built-in benchmark tables
    pub fn builtin() -> Self {
        Self {
            persona: persona_generation_cases(),
            rating: persona_rating_cases(),
            menu: menu_recommendation_cases(),
        }
    }
}

fn case(kind: TaskKind, id: &str, tag: &str, payload: Value) -> EvaluationCase {
    EvaluationCase {
        id: id.to_string(),
        task_kind: kind,
        tag: tag.to_string(),
        payload,
    }
}

fn persona_generation_cases() -> Vec<EvaluationCase> {
    let kind = TaskKind::PersonaGeneration;
    vec![
        // Easy
        case(kind, "pg_easy_1", "easy", json!({
            "name": "Kim Chulsoo",
            "gender": "남성",
            "age_group": "30대",
            "allergies": [],
            "preferred_food_categories": ["한식", "일식"],
            "preferred_ingredients": ["육류", "채소"]
        })),
        case(kind, "pg_easy_2", "easy", json!({
            "name": "Lee Younghee",
            "gender": "여성",
            "age_group": "20대",
            "allergies": ["복숭아"],
            "preferred_food_categories": ["양식"],
            "preferred_ingredients": ["해산물"]
        })),
        case(kind, "pg_easy_3", "easy", json!({
            "name": "Park Minsoo",
            "gender": "남성",
            "age_group": "40대",
            "allergies": [],
            "preferred_food_categories": ["중식"],
            "preferred_ingredients": ["육류"]
        })),
        // Medium: intent only implied by the note
        case(kind, "pg_med_1", "medium", json!({
            "name": "Fitness Junkie",
            "gender": "여성",
            "age_group": "20대",
            "allergies": [],
            "preferred_food_categories": ["세계음식"],
            "preferred_ingredients": ["가금류", "채소"],
            "note": "Trying to gain muscle, avoids fried food"
        })),
        case(kind, "pg_med_2", "medium", json!({
            "name": "Vegetarian Fan",
            "gender": "기타",
            "age_group": "30대",
            "allergies": [],
            "preferred_food_categories": ["한식"],
            "preferred_ingredients": ["채소", "곡물/면", "유제품"],
            "note": "No meat at all"
        })),
        case(kind, "pg_med_3", "medium", json!({
            "name": "Spicy Lover",
            "gender": "남성",
            "age_group": "50대",
            "allergies": [],
            "preferred_food_categories": ["한식", "중식"],
            "preferred_ingredients": ["해산물"],
            "note": "Loves extremely spicy food"
        })),
        case(kind, "pg_med_4", "medium", json!({
            "name": "Light Eater",
            "gender": "여성",
            "age_group": "60대 이상",
            "allergies": [],
            "preferred_food_categories": ["일식"],
            "preferred_ingredients": ["채소", "해산물"],
            "note": "Small portions only"
        })),
        // Hard: multiple allergies and medical diets
        case(kind, "pg_hard_1", "hard", json!({
            "name": "Multiple Allergies",
            "gender": "남성",
            "age_group": "20대",
            "allergies": ["새우", "게", "조개류", "땅콩"],
            "preferred_food_categories": ["한식", "양식"],
            "preferred_ingredients": ["육류"]
        })),
        case(kind, "pg_hard_2", "hard", json!({
            "name": "Keto Dieter",
            "gender": "여성",
            "age_group": "30대",
            "allergies": ["밀"],
            "preferred_food_categories": ["양식", "세계음식"],
            "preferred_ingredients": ["육류", "채소", "유제품"],
            "note": "Strict Keto, no carbs"
        })),
        case(kind, "pg_hard_3", "hard", json!({
            "name": "Elderly Care",
            "gender": "남성",
            "age_group": "60대 이상",
            "allergies": ["우유", "대두"],
            "preferred_food_categories": ["한식"],
            "preferred_ingredients": ["채소", "곡물/면"],
            "note": "Low salt, soft texture needed"
        })),
    ]
}

fn persona_rating_cases() -> Vec<EvaluationCase> {
    let kind = TaskKind::PersonaRating;
    vec![
        case(kind, "pr_pos_1", "positive", json!({
            "persona": {
                "name": "Kim Chulsoo",
                "allergies": [],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["육류"],
                "budget": "보통"
            },
            "restaurant": {
                "name": "한우명가",
                "category": "한식",
                "price_range": "보통",
                "signature_menu": ["한우 불고기", "갈비탕"],
                "allergens": ["대두", "밀"]
            }
        })),
        case(kind, "pr_pos_2", "positive", json!({
            "persona": {
                "name": "Light Eater",
                "allergies": [],
                "preferred_food_categories": ["일식"],
                "preferred_ingredients": ["해산물", "채소"],
                "budget": "높음"
            },
            "restaurant": {
                "name": "스시 하루",
                "category": "일식",
                "price_range": "높음",
                "signature_menu": ["오마카세", "모둠 사시미"],
                "allergens": ["생선", "대두"]
            }
        })),
        case(kind, "pr_pos_3", "positive", json!({
            "persona": {
                "name": "Vegetarian Fan",
                "allergies": [],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["채소", "곡물/면"],
                "budget": "낮음"
            },
            "restaurant": {
                "name": "초록식탁",
                "category": "한식",
                "price_range": "낮음",
                "signature_menu": ["산채비빔밥", "두부전골"],
                "allergens": ["대두"]
            }
        })),
        case(kind, "pr_neg_1", "negative", json!({
            "persona": {
                "name": "Vegetarian Fan",
                "allergies": [],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["채소"],
                "note": "No meat at all"
            },
            "restaurant": {
                "name": "돼지 굽는 집",
                "category": "한식",
                "price_range": "보통",
                "signature_menu": ["삼겹살", "돼지갈비"],
                "allergens": []
            }
        })),
        case(kind, "pr_neg_2", "negative", json!({
            "persona": {
                "name": "Keto Dieter",
                "allergies": [],
                "preferred_food_categories": ["양식"],
                "preferred_ingredients": ["육류", "유제품"],
                "note": "Strict Keto, no carbs"
            },
            "restaurant": {
                "name": "파스타 팩토리",
                "category": "양식",
                "price_range": "보통",
                "signature_menu": ["까르보나라", "마르게리타 피자"],
                "allergens": ["밀", "우유"]
            }
        })),
        case(kind, "pr_neg_3", "negative", json!({
            "persona": {
                "name": "Light Eater",
                "allergies": [],
                "preferred_food_categories": ["일식"],
                "preferred_ingredients": ["채소"],
                "budget": "낮음"
            },
            "restaurant": {
                "name": "더 스테이크 하우스",
                "category": "양식",
                "price_range": "매우 높음",
                "signature_menu": ["토마호크 스테이크"],
                "allergens": ["우유"]
            }
        })),
        case(kind, "pr_neg_4", "negative", json!({
            "persona": {
                "name": "Elderly Care",
                "allergies": [],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["채소"],
                "note": "Low salt, soft texture needed"
            },
            "restaurant": {
                "name": "불맛 마라탕",
                "category": "중식",
                "price_range": "보통",
                "signature_menu": ["마라탕", "마라샹궈"],
                "allergens": ["땅콩", "대두"]
            }
        })),
        // Group size against capacity; the rubric only checks the score
        // threshold, so the capacity detail is informational.
        case(kind, "pr_neg_5", "negative", json!({
            "persona": {
                "name": "Team Lead",
                "allergies": [],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["육류"],
                "note": "Booking a team dinner for 12 people"
            },
            "restaurant": {
                "name": "골목 작은 식당",
                "category": "한식",
                "price_range": "보통",
                "signature_menu": ["김치찌개"],
                "allergens": [],
                "capacity": 6
            }
        })),
        case(kind, "pr_crit_1", "critical", json!({
            "persona": {
                "name": "Multiple Allergies",
                "allergies": ["새우", "게", "조개류", "땅콩"],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["육류"]
            },
            "restaurant": {
                "name": "바다 해물탕",
                "category": "한식",
                "price_range": "보통",
                "signature_menu": ["해물탕", "꽃게찜"],
                "allergens": ["새우", "게", "조개류"]
            }
        })),
        case(kind, "pr_crit_2", "critical", json!({
            "persona": {
                "name": "Lee Younghee",
                "allergies": ["복숭아"],
                "preferred_food_categories": ["양식"],
                "preferred_ingredients": ["과일"]
            },
            "restaurant": {
                "name": "피치 디저트 카페",
                "category": "디저트",
                "price_range": "보통",
                "signature_menu": ["복숭아 타르트", "복숭아 빙수"],
                "allergens": ["복숭아", "밀", "우유"]
            }
        })),
        case(kind, "pr_crit_3", "critical", json!({
            "persona": {
                "name": "Elderly Care",
                "allergies": ["우유", "대두"],
                "preferred_food_categories": ["한식"],
                "preferred_ingredients": ["채소"]
            },
            "restaurant": {
                "name": "두부 명가",
                "category": "한식",
                "price_range": "낮음",
                "signature_menu": ["순두부찌개", "두부김치"],
                "allergens": ["대두"]
            }
        })),
    ]
}

fn menu_recommendation_cases() -> Vec<EvaluationCase> {
    let kind = TaskKind::MenuRecommendation;
    vec![
        case(kind, "mr_basic_1", "basic", json!({
            "group": {
                "members": [
                    {"name": "Kim Chulsoo", "allergies": [], "preferences": ["육류"]},
                    {"name": "Park Minsoo", "allergies": [], "preferences": ["육류", "채소"]}
                ],
                "budget_per_person": 20000
            },
            "restaurant": {
                "name": "한우명가",
                "allergens": ["대두", "밀"],
                "menu": [
                    {"name": "한우 불고기", "price": 18000},
                    {"name": "갈비탕", "price": 14000},
                    {"name": "된장찌개", "price": 9000}
                ]
            },
            "event": {"occasion": "점심 식사"}
        })),
        case(kind, "mr_budget_1", "budget", json!({
            "group": {
                "members": [
                    {"name": "A", "allergies": [], "preferences": ["한식"]},
                    {"name": "B", "allergies": [], "preferences": ["중식"]},
                    {"name": "C", "allergies": [], "preferences": ["한식"]},
                    {"name": "D", "allergies": [], "preferences": ["분식"]}
                ],
                "budget_per_person": 10000
            },
            "restaurant": {
                "name": "동네 분식",
                "allergens": ["밀", "대두"],
                "menu": [
                    {"name": "떡볶이", "price": 5000},
                    {"name": "김밥", "price": 4000},
                    {"name": "라면", "price": 4500},
                    {"name": "모둠튀김", "price": 8000}
                ]
            },
            "event": {"occasion": "스터디 모임"}
        })),
        case(kind, "mr_allergy_1", "allergy", json!({
            "group": {
                "members": [
                    {"name": "Multiple Allergies", "allergies": ["새우", "게"], "preferences": ["육류"]},
                    {"name": "Spicy Lover", "allergies": [], "preferences": ["해산물"]},
                    {"name": "Kim Chulsoo", "allergies": [], "preferences": ["한식"]}
                ],
                "budget_per_person": 30000
            },
            "restaurant": {
                "name": "바다 해물탕",
                "allergens": ["새우", "게", "조개류"],
                "menu": [
                    {"name": "해물탕", "price": 45000},
                    {"name": "꽃게찜", "price": 50000},
                    {"name": "제육볶음", "price": 12000},
                    {"name": "공기밥", "price": 1000}
                ]
            },
            "event": {"occasion": "회식"}
        })),
        case(kind, "mr_allergy_2", "allergy", json!({
            "group": {
                "members": [
                    {"name": "Elderly Care", "allergies": ["우유", "대두"], "preferences": ["채소"]},
                    {"name": "Lee Younghee", "allergies": ["복숭아"], "preferences": ["양식"]}
                ],
                "budget_per_person": 25000
            },
            "restaurant": {
                "name": "파스타 팩토리",
                "allergens": ["밀", "우유"],
                "menu": [
                    {"name": "알리오 올리오", "price": 15000},
                    {"name": "까르보나라", "price": 17000},
                    {"name": "그린 샐러드", "price": 11000}
                ]
            },
            "event": {"occasion": "가족 모임"}
        })),
        case(kind, "mr_large_1", "large_group", json!({
            "group": {
                "members": [
                    {"name": "M1", "allergies": [], "preferences": ["육류"]},
                    {"name": "M2", "allergies": ["땅콩"], "preferences": ["채소"]},
                    {"name": "M3", "allergies": [], "preferences": ["해산물"]},
                    {"name": "M4", "allergies": [], "preferences": ["육류"]},
                    {"name": "M5", "allergies": [], "preferences": ["곡물/면"]},
                    {"name": "M6", "allergies": [], "preferences": ["한식"]}
                ],
                "budget_per_person": 15000
            },
            "restaurant": {
                "name": "만리장성",
                "allergens": ["밀", "대두", "땅콩"],
                "menu": [
                    {"name": "짜장면", "price": 7000},
                    {"name": "짬뽕", "price": 8000},
                    {"name": "탕수육", "price": 22000},
                    {"name": "깐풍기", "price": 25000}
                ]
            },
            "event": {"occasion": "팀 송년회"}
        })),
    ]
}
