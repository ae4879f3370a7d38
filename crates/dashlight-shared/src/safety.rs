//! Safety interceptor: hard-coded trigger phrases checked before any KB logic.
//!
//! Critical rules preempt every flow with a `safety_alert`. An alert that ends
//! the conversation carries a critical final card; one that continues offers a
//! single acknowledge option instead. Warning rules only attach a note to the
//! normal reply.

use crate::knowledge::Severity;
use crate::payload::{
    AlertLevel, ConfidenceLevel, ConversationSummaries, DiagnosisReport, DiagnosisResult,
    MechanicReport, Payload, ReportStatus, StatusColor, DISCLAIMER,
};
use crate::state::DiagnosticState;
use crate::summary::{build_summaries, SummaryFacts};
use tracing::{info, warn};

/// Words that cancel a keyword when found among the three words before it.
const NEGATIONS: &[&str] = &["no", "not", "without", "never", "לא", "אין", "בלי", "ללא", "אף"];
const NEGATION_WINDOW: usize = 3;

/// Question id held while a continuing alert waits to be acknowledged.
pub const SAFETY_ACK_ID: &str = "safety_ack";
pub const SAFETY_ACK_OPTION: &str = "I understand, I'll continue carefully";

const EMERGENCY_PROBABILITY: f64 = 0.95;

/// Failure class of a critical rule, which fixes the tow conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyClass {
    Brakes,
    Steering,
    Fire,
    Fuel,
    Overheating,
    OilPressure,
    /// Used when a critical rule names no class.
    General,
}

impl EmergencyClass {
    pub fn issue(&self) -> &'static str {
        match self {
            EmergencyClass::Brakes => "Brake system failure",
            EmergencyClass::Steering => "Loss of steering",
            EmergencyClass::Fire => "Smoke or fire in the vehicle",
            EmergencyClass::Fuel => "Suspected fuel leak",
            EmergencyClass::Overheating => "Severe engine overheating",
            EmergencyClass::OilPressure => "Loss of oil pressure",
            EmergencyClass::General => "Critical vehicle fault",
        }
    }

    pub fn tow_conditions(&self) -> &'static [&'static str] {
        match self {
            EmergencyClass::Brakes => &["The brakes do not stop the car", "The brake pedal is soft or sinks"],
            EmergencyClass::Steering => &["The steering wheel is locked or does not respond"],
            EmergencyClass::Fire => &["There is smoke or fire", "Do not drive the vehicle at all"],
            EmergencyClass::Fuel => &["There is a smell of fuel or a visible leak", "Do not start the engine"],
            EmergencyClass::Overheating => &["The engine is boiling or steaming", "The temperature gauge is in the red"],
            EmergencyClass::OilPressure => &["The oil light stays on", "Driving on risks destroying the engine"],
            EmergencyClass::General => &["General emergency"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyRule {
    pub id: &'static str,
    pub keywords: &'static [&'static str],
    pub title: &'static str,
    pub message: &'static str,
    pub level: AlertLevel,
    pub end_conversation: bool,
    pub follow_up_message: Option<&'static str>,
    pub next_scenario_id: Option<&'static str>,
    pub class: Option<EmergencyClass>,
}

impl SafetyRule {
    pub fn is_critical(&self) -> bool {
        self.level == AlertLevel::Critical
    }

    /// Scenario the conversation moves into once the alert is acknowledged.
    pub fn continues_into(&self) -> Option<&'static str> {
        self.next_scenario_id.filter(|_| !self.end_conversation)
    }
}

pub static SAFETY_RULES: &[SafetyRule] = &[
    SafetyRule {
        id: "brakes_fail",
        keywords: &[
            "brakes don't work",
            "brakes not working",
            "brakes failed",
            "no brakes",
            "lost my brakes",
            "brake pedal went to the floor",
            "pedal goes to the floor",
            "spongy brake pedal",
            "car won't stop",
            "אין בלמים",
            "הבלמים לא עובדים",
            "בלמים לא עובדים",
            "דוושה רכה",
            "דוושה ספוגית",
            "דוושה שוקעת",
            "דוושה ירדה לרצפה",
            "איבוד בלמים",
            "אין ברקסים",
            "בלמים נכשלו",
            "בלמים לא תופסים",
            "אין עצירה",
        ],
        title: "🚨 Brake failure",
        message: "Stop in a safe place as soon as possible! A brake problem is life-threatening. Do not keep driving. Call a tow truck.",
        level: AlertLevel::Critical,
        end_conversation: true,
        follow_up_message: Some("Good that you stopped. Because this is a critical brake fault we cannot continue the diagnosis. Call a tow truck and wait in a safe place."),
        next_scenario_id: None,
        class: Some(EmergencyClass::Brakes),
    },
    SafetyRule {
        id: "steering_fail",
        keywords: &[
            "steering locked",
            "can't turn the wheel",
            "cannot turn the steering",
            "lost steering",
            "steering not responding",
            "הגה ננעל",
            "אי אפשר לסובב את ההגה",
            "הגה קשה מאוד",
            "אין היגוי",
            "אובדן היגוי",
            "הגה לא מגיב",
        ],
        title: "🚨 Loss of steering",
        message: "Serious safety hazard! Losing steering endangers you and everyone around you. Pull over safely and call a tow truck.",
        level: AlertLevel::Critical,
        end_conversation: true,
        follow_up_message: Some("Are you stopped in a safe place? A steering fault needs a garage and a tow. The conversation ends here."),
        next_scenario_id: None,
        class: Some(EmergencyClass::Steering),
    },
    SafetyRule {
        id: "smoke_fire",
        keywords: &[
            "smoke from the engine",
            "smoke coming out",
            "engine is smoking",
            "black smoke",
            "i see smoke",
            "car is on fire",
            "fire in the car",
            "flames",
            "sparks",
            "יוצא עשן",
            "עשן מהמנוע",
            "יש עשן",
            "עשן יוצא",
            "מנוע מעשן",
            "עשן שחור",
            "רואה עשן",
            "אש ברכב",
            "שריפה ברכב",
            "הרכב בוער",
            "עלה באש",
            "להבות",
            "ניצוצות",
        ],
        title: "🔥 Smoke or fire",
        message: "Stop in a safe place, turn off the engine now, get out of the car, move to a safe distance and call the fire department.",
        level: AlertLevel::Critical,
        end_conversation: true,
        follow_up_message: Some("Keep away from the car! If anyone is hurt call an ambulance. Do not approach the car until help arrives."),
        next_scenario_id: None,
        class: Some(EmergencyClass::Fire),
    },
    SafetyRule {
        id: "fuel_leak",
        keywords: &[
            "smell of fuel",
            "smell of gas",
            "smells like gasoline",
            "fuel leak",
            "fuel dripping",
            "puddle of fuel",
            "ריח דלק",
            "ריח בנזין",
            "ריח סולר",
            "נזילת דלק",
            "דלק מטפטף",
            "שלולית דלק",
        ],
        title: "⛽ Suspected fuel leak",
        message: "Suspected fuel leak! Turn off the engine now and do not try to start it again. Move away from the car and do not smoke or light a flame near it.",
        level: AlertLevel::Critical,
        end_conversation: true,
        follow_up_message: Some("Stay away from the car and keep any flame away. Call roadside assistance to handle the leak."),
        next_scenario_id: None,
        class: Some(EmergencyClass::Fuel),
    },
    SafetyRule {
        id: "overheating_extreme",
        keywords: &[
            "steam from the engine",
            "steam coming out",
            "engine is boiling",
            "coolant is boiling",
            "coolant spilling",
            "strong sweet smell",
            "אדים מהמנוע",
            "קיטור מהמנוע",
            "קיטור",
            "רתיחה",
            "המנוע רותח",
            "מים רותחים",
            "נוזל קירור נשפך",
            "ריח מתוק חזק",
        ],
        title: "🚨 Engine boiling",
        message: "Suspected boiling! Pull over now, turn off the engine and do not open the hood under any circumstances, you can be scalded. Move away from the car and call a tow truck.",
        level: AlertLevel::Critical,
        end_conversation: true,
        follow_up_message: Some("Do not open the hood or the radiator cap until the engine has cooled completely (at least 30 minutes). Call a tow truck to a garage."),
        next_scenario_id: None,
        class: Some(EmergencyClass::Overheating),
    },
    SafetyRule {
        id: "overheating_severe",
        keywords: &[
            "temperature gauge in the red",
            "temp gauge is red",
            "temperature light is red",
            "gauge is in the red",
            "מחוג חום באדום",
            "נורת חום אדומה",
            "נורת טמפרטורה אדומה",
            "מד חום עולה",
            "מד חום גבוה",
            "מחוג באדום",
        ],
        title: "🌡️ Overheating",
        message: "Suspected overheating! Pull over safely and turn off the engine. Never open the radiator cap while the engine is hot, you can be scalded.",
        level: AlertLevel::Critical,
        end_conversation: false,
        follow_up_message: Some("Good. Now that the car is off and the engine is cooling, we can diagnose carefully. Let's start."),
        next_scenario_id: Some("overheating"),
        class: Some(EmergencyClass::Overheating),
    },
    SafetyRule {
        id: "oil_pressure",
        keywords: &[
            "no oil pressure",
            "lost oil pressure",
            "oil pressure dropped",
            "oil light flashing",
            "נורת שמן אדומה",
            "אין שמן",
            "מנורת קומקום",
            "נורת שמן מהבהבת",
            "מנורת אלדין אדומה",
        ],
        title: "🛢️ Oil pressure lost",
        message: "Suspected critical oil pressure problem! Stop and turn off the engine now. Driving on can seriously damage the engine. Call a tow truck.",
        level: AlertLevel::Critical,
        end_conversation: true,
        follow_up_message: Some("Stopped? Good. Call a tow truck to a garage to deal with the lubrication problem."),
        next_scenario_id: None,
        class: Some(EmergencyClass::OilPressure),
    },
    SafetyRule {
        id: "safety_hood",
        keywords: &[
            "open the hood",
            "check the oil",
            "check the coolant",
            "פתח מכסה מנוע",
            "לבדוק שמן",
            "לבדוק מים",
            "בדיקת שמן",
            "בדיקת נוזל קירור",
        ],
        title: "Before opening the hood",
        message: "Before opening the hood: make sure the engine is off, the handbrake is on and the engine is not boiling (no steam). Watch out for hot parts!",
        level: AlertLevel::Warning,
        end_conversation: false,
        follow_up_message: Some("Carefully, let's open the hood."),
        next_scenario_id: None,
        class: None,
    },
    SafetyRule {
        id: "safety_under_car",
        keywords: &[
            "under the car",
            "crawl under",
            "leak underneath",
            "מתחת לרכב",
            "נזילה מלמטה",
            "לבדוק מלמטה",
            "לזחול מתחת",
        ],
        title: "Working under the car",
        message: "Serious warning: never get under a car held up only by a jack! Make sure it is on level ground and properly supported.",
        level: AlertLevel::Warning,
        end_conversation: false,
        follow_up_message: Some("Only look underneath if you are completely sure the car is stable."),
        next_scenario_id: None,
        class: None,
    },
    SafetyRule {
        id: "battery_acid",
        keywords: &[
            "corrosion on the battery",
            "white powder on the battery",
            "battery is leaking",
            "battery acid",
            "קורוזיה על המצבר",
            "אבקה לבנה על המצבר",
            "נוזל מהמצבר",
            "מצבר מדליף",
        ],
        title: "Battery acid",
        message: "Careful: the powder or liquid on the battery is acid. Do not touch it with bare hands and rinse well with water if you did.",
        level: AlertLevel::Warning,
        end_conversation: false,
        follow_up_message: Some("Protect your eyes and hands. Let's continue."),
        next_scenario_id: None,
        class: None,
    },
];

/// Lowercase, drop quote characters, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '״' | '"' | '\'' | '`'))
        .collect();
    cleaned.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when `keyword` occurs in `text` at least once without a negation
/// word among the preceding three words. Both inputs are normalized.
pub fn contains_non_negated(text: &str, keyword: &str) -> bool {
    let text = normalize_text(text);
    let keyword = normalize_text(keyword);
    if keyword.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = text[start..].find(&keyword) {
        let at = start + pos;
        let negated = text[..at]
            .split_whitespace()
            .rev()
            .take(NEGATION_WINDOW)
            .any(|w| NEGATIONS.contains(&w));
        if !negated {
            return true;
        }
        start = at + keyword.len();
    }
    false
}

/// First matching rule, critical rules before warnings.
pub fn scan(text: &str) -> Option<&'static SafetyRule> {
    let hit = |rule: &&SafetyRule| rule.keywords.iter().any(|k| contains_non_negated(text, k));
    let found = SAFETY_RULES
        .iter()
        .filter(|r| r.is_critical())
        .find(hit)
        .or_else(|| SAFETY_RULES.iter().filter(|r| !r.is_critical()).find(hit));
    if let Some(rule) = found {
        warn!(rule = rule.id, level = ?rule.level, "Safety rule matched");
    }
    found
}

pub fn rule(id: &str) -> Option<&'static SafetyRule> {
    SAFETY_RULES.iter().find(|r| r.id == id)
}

/// The continuing rule that leads into `scenario_id`.
pub fn continuing_rule(scenario_id: &str) -> Option<&'static SafetyRule> {
    SAFETY_RULES.iter().find(|r| r.continues_into() == Some(scenario_id))
}

/// Critical-card report for a rule, generic when the rule names no class.
pub fn emergency_card(rule: &SafetyRule, state: &DiagnosticState) -> DiagnosisReport {
    let class = rule.class.unwrap_or(EmergencyClass::General);
    let tow: Vec<String> = class.tow_conditions().iter().map(|s| s.to_string()).collect();
    let light_id = state.detected_light_type.as_deref().unwrap_or("");
    let facts = SummaryFacts {
        light_id,
        light_name: light_id,
        scenario_id: rule.id,
        scenario_description: rule.title,
        top: Some((class.issue(), EMERGENCY_PROBABILITY)),
        additional: Vec::new(),
        recommendation: rule.message,
        severity: Severity::Critical,
        needs_tow: true,
    };
    let (user, mechanic) = build_summaries(&facts, state);
    DiagnosisReport {
        title: rule.title.to_string(),
        confidence: EMERGENCY_PROBABILITY,
        confidence_level: ConfidenceLevel::High,
        display_confidence: EMERGENCY_PROBABILITY,
        display_confidence_level: ConfidenceLevel::High,
        severity: Severity::Critical,
        summary: rule.message.to_string(),
        results: vec![DiagnosisResult {
            issue: class.issue().to_string(),
            probability: EMERGENCY_PROBABILITY,
            explanation: rule.message.to_string(),
            display_percent: Some(95),
        }],
        status: ReportStatus {
            color: StatusColor::Red,
            text: "Stop now!".to_string(),
            instruction: rule.message.to_string(),
        },
        next_steps: vec!["Call a tow truck".to_string()],
        recommendations: vec!["Do not keep driving".to_string(), "Call a tow truck".to_string()],
        disclaimer: DISCLAIMER.to_string(),
        show_tow_button: true,
        tow_conditions: tow.clone(),
        mechanic_report: Some(MechanicReport {
            top_suspect: class.issue().to_string(),
            score: 10.0,
            severity: Severity::Critical,
            status: "Stop now!".to_string(),
            instruction: rule.message.to_string(),
            tow_conditions: tow,
            blind_spots: Vec::new(),
        }),
        conversation_summaries: ConversationSummaries { user, mechanic },
    }
}

pub fn safety_alert(rule: &SafetyRule, state: &DiagnosticState) -> Payload {
    info!(rule = rule.id, end = rule.end_conversation, "Safety alert raised");
    Payload::SafetyAlert {
        title: rule.title.to_string(),
        message: rule.message.to_string(),
        level: rule.level,
        stop_chat: rule.end_conversation,
        follow_up_message: rule.follow_up_message.map(str::to_string),
        next_scenario_id: rule.next_scenario_id.map(str::to_string),
        options: match rule.continues_into() {
            Some(_) => vec![SAFETY_ACK_OPTION.to_string()],
            None => Vec::new(),
        },
        final_card: rule
            .end_conversation
            .then(|| Box::new(emergency_card(rule, state))),
    }
}
