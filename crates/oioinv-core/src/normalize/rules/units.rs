//! Unit-of-measure mapping to UN/ECE Recommendation 20 codes.

/// Fallback code when the unit is absent or unknown ("each").
pub const DEFAULT_UNIT_CODE: &str = "EA";

/// Map a Danish unit abbreviation to its UN/ECE code.
pub fn unit_code(unit: Option<&str>) -> &'static str {
    let Some(unit) = unit else {
        return DEFAULT_UNIT_CODE;
    };
    let unit = unit.trim().trim_end_matches('.').to_lowercase();
    match unit.as_str() {
        "stk" | "styk" | "stk/pcs" | "pcs" | "ea" => "EA",
        "sæt" | "saet" | "set" => "SET",
        "pk" | "pakke" | "pakker" => "PK",
        "m" | "meter" | "mtr" => "MTR",
        "kg" | "kilo" => "KGM",
        "l" | "liter" | "ltr" => "LTR",
        "t" | "time" | "timer" | "hour" | "hours" => "HUR",
        "dag" | "dage" | "day" | "days" => "DAY",
        "kasse" | "kasser" => "CS",
        "rulle" | "ruller" => "RO",
        "flaske" | "flasker" => "BO",
        "palle" | "paller" => "PF",
        "boks" | "bokse" => "BX",
        _ => DEFAULT_UNIT_CODE,
    }
}
