use std::collections::HashMap;

/// Built-in weapon codes and their display names.
const WEAPONS: &[(&str, &str)] = &[
    ("behr_rifle_ballistic_01", "P4-AR Rifle"),
    ("behr_rifle_ballistic_02", "Karna Rifle"),
    ("behr_smg_ballistic_01", "P8-SC SMG"),
    ("behr_pistol_ballistic_01", "S-38 Pistol"),
    ("behr_sniper_ballistic_01", "P6-LR Sniper Rifle"),
    ("behr_lmg_ballistic_01", "FS-9 LMG"),
    ("behr_glauncher_ballistic_01", "GP-33 Grenade Launcher"),
    ("ksar_shotgun_energy_01", "Devastator Shotgun"),
    ("ksar_pistol_kinetic_01", "Yubarev Pistol"),
    ("klwe_pistol_energy_01", "Arclight Pistol"),
    ("klwe_rifle_energy_01", "Arrowhead Sniper Rifle"),
    ("klwe_smg_energy_01", "Lumin V SMG"),
    ("gmni_rifle_ballistic_01", "F55 LMG"),
    ("apar_special_ballistic_01", "Scourge Railgun"),
    ("apar_special_ballistic_02", "Animus Missile Launcher"),
    ("volt_rifle_energy_01", "Zenith Laser Sniper"),
    ("volt_smg_energy_01", "Fresnel Energy LMG"),
    ("sasu_pistol_toy_01", "Salvo Frag Pistol"),
];

/// Built-in zone codes and their display names.
const ZONES: &[(&str, &str)] = &[
    ("OOC_Stanton_1_Hurston", "Hurston"),
    ("OOC_Stanton_1a_Arial", "Arial"),
    ("OOC_Stanton_1b_Aberdeen", "Aberdeen"),
    ("OOC_Stanton_2_Crusader", "Crusader"),
    ("OOC_Stanton_2a_Cellin", "Cellin"),
    ("OOC_Stanton_2b_Daymar", "Daymar"),
    ("OOC_Stanton_2c_Yela", "Yela"),
    ("OOC_Stanton_3_ArcCorp", "ArcCorp"),
    ("OOC_Stanton_3a_Lyria", "Lyria"),
    ("OOC_Stanton_3b_Wala", "Wala"),
    ("OOC_Stanton_4_Microtech", "microTech"),
    ("OOC_Stanton_4a_Calliope", "Calliope"),
    ("OOC_Stanton_4b_Clio", "Clio"),
    ("OOC_Stanton_4c_Euterpe", "Euterpe"),
    ("RR_HUR_LEO", "Everus Harbor"),
    ("RR_CRU_LEO", "Seraphim Station"),
    ("RR_ARC_LEO", "Baijini Point"),
    ("RR_MIC_LEO", "Port Tressler"),
    ("Pyro", "Pyro System"),
];

/// Raw game codes carry a trailing `_<entity id>`; ids are long digit runs.
const MIN_ENTITY_SUFFIX_DIGITS: usize = 6;

fn strip_entity_suffix(raw: &str) -> Option<&str> {
    let (head, tail) = raw.rsplit_once('_')?;
    (tail.len() >= MIN_ENTITY_SUFFIX_DIGITS && tail.bytes().all(|b| b.is_ascii_digit()))
        .then_some(head)
}

fn build(builtin: &[(&str, &str)], extra: &HashMap<String, String>) -> HashMap<String, String> {
    let mut table: HashMap<String, String> = builtin
        .iter()
        .map(|(raw, display)| (raw.to_string(), display.to_string()))
        .collect();
    table.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    table
}

/// Static raw-code → display-name lookup for weapons and zones.
///
/// Lookups are total: an unknown code maps to itself, so two raw codes only
/// collapse into one leaderboard key when a table says they should.
#[derive(Debug, Clone)]
pub struct Normalizer {
    weapons: HashMap<String, String>,
    zones: HashMap<String, String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&HashMap::new(), &HashMap::new())
    }
}

impl Normalizer {
    /// Build from the built-in tables plus configured entries, which win on
    /// conflict.
    pub fn new(extra_weapons: &HashMap<String, String>, extra_zones: &HashMap<String, String>) -> Self {
        Self {
            weapons: build(WEAPONS, extra_weapons),
            zones: build(ZONES, extra_zones),
        }
    }

    pub fn weapon<'a>(&'a self, raw: &'a str) -> &'a str {
        Self::lookup(&self.weapons, raw)
    }

    pub fn zone<'a>(&'a self, raw: &'a str) -> &'a str {
        Self::lookup(&self.zones, raw)
    }

    fn lookup<'a>(table: &'a HashMap<String, String>, raw: &'a str) -> &'a str {
        if let Some(display) = table.get(raw) {
            return display;
        }
        strip_entity_suffix(raw)
            .and_then(|base| table.get(base))
            .map(String::as_str)
            .unwrap_or(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_display_names() {
        let n = Normalizer::default();
        assert_eq!(n.weapon("behr_rifle_ballistic_01"), "P4-AR Rifle");
        assert_eq!(n.zone("OOC_Stanton_2b_Daymar"), "Daymar");
    }

    #[test]
    fn unknown_codes_fall_back_to_identity() {
        let n = Normalizer::default();
        assert_eq!(n.weapon("mystery_blade"), "mystery_blade");
        assert_eq!(n.zone(""), "");
        assert_eq!(n.zone("N/A"), "N/A");
    }

    #[test]
    fn entity_suffix_is_ignored_for_lookup_only() {
        let n = Normalizer::default();
        assert_eq!(n.weapon("klwe_pistol_energy_01_3124567890123"), "Arclight Pistol");
        // Unknown base: the raw code comes back untouched, suffix included.
        assert_eq!(n.weapon("homemade_gun_3124567890123"), "homemade_gun_3124567890123");
        // Short numeric tails are part of the code, not an entity id.
        assert_eq!(n.weapon("behr_rifle_ballistic_01"), "P4-AR Rifle");
    }

    #[test]
    fn configured_entries_override_builtins() {
        let weapons = HashMap::from([
            ("behr_rifle_ballistic_01".to_string(), "Behring P4".to_string()),
            ("custom_01".to_string(), "Custom".to_string()),
        ]);
        let n = Normalizer::new(&weapons, &HashMap::new());
        assert_eq!(n.weapon("behr_rifle_ballistic_01"), "Behring P4");
        assert_eq!(n.weapon("custom_01"), "Custom");
        assert_eq!(n.weapon("klwe_pistol_energy_01"), "Arclight Pistol");
    }
}
