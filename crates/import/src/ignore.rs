/// Substrings marking notifications that are neither transactions nor
/// "missing templates": OTPs, promos, balance pings, the user's own replies.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // MAIB
    "Vas privetstvuet servis opoveshenia ot MAIB",
    "Oper.: Ostatok",
    // Eximbank auth / OTP
    "Autentificarea Dvs. in sistemul Eximbank Online a fost inregistrata la",
    "Parola de unica folosinta pentru tranzactia cu ID-ul",
    "OTP-ul pentru Plati din Exim Personal este",
    "Va multumim ca ati ales serviciul Eximbank SMS Info.",
    "Parola de Unica Folosinta (OTP) a Dvs. pentru logare este",
    "Parola:",
    "Parola Dvs.",
    // Failed, cancelled and transfer status notices
    "Tranzactie esuata,",
    "Tranzactia din",
    "Anulare tranzactie",
    // Marketing
    "Acesta este momentul pe care il asteptai!",
    "Vrei un card pentru copilul tau?",
    "Refinanteaza creditele de consum de la alte",
    "Profita acum! Credit PERSONAL sau MAGNIFIC",
    // Maintenance
    "In data de",
    // Wallet provisioning
    "Cardul Eximbank",
    // Own messages in an export
    "] Me:",
];

/// Flat list of literal, case-sensitive, unanchored substrings.
#[derive(Debug, Clone)]
pub struct IgnoreClassifier {
    patterns: Vec<String>,
}

impl Default for IgnoreClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()))
    }
}

impl IgnoreClassifier {
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }

    /// Adds extra patterns on top of the current list.
    pub fn extend(mut self, patterns: impl IntoIterator<Item = String>) -> Self {
        self.patterns
            .extend(patterns.into_iter().filter(|p| !p.is_empty()));
        self
    }

    pub fn should_ignore(&self, content: &str) -> bool {
        self.patterns.iter().any(|p| content.contains(p.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_and_promos_are_ignored() {
        let c = IgnoreClassifier::default();
        assert!(c.should_ignore("Parola:123456 Card 9..7890"));
        assert!(c.should_ignore("Parola Dvs. este 12345678"));
        assert!(c.should_ignore("Vrei un card pentru copilul tau? Afla mai multe"));
        assert!(c.should_ignore("Oper.: Ostatok\nKarta: *1234"));
    }

    #[test]
    fn transactions_are_not_ignored() {
        let c = IgnoreClassifier::default();
        assert!(!c.should_ignore("Op: Tovary i uslugi\nKarta: *1234\nSumma: 34 MDL"));
        assert!(!c.should_ignore(
            "Debitare cont Card 9..7890, Data 08.04.2024 09:27:01, Suma 9.65 MDL, Detalii X, Disponibil 1.00 MDL"
        ));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let c = IgnoreClassifier::default();
        assert!(!c.should_ignore("parola: 123"));
    }

    #[test]
    fn pattern_may_appear_anywhere() {
        let c = IgnoreClassifier::new(vec!["promo".to_string()]);
        assert!(c.should_ignore("big promo today"));
        assert!(!c.should_ignore("nothing here"));
    }

    #[test]
    fn empty_patterns_are_dropped() {
        let c = IgnoreClassifier::new(vec![String::new()]);
        assert!(c.patterns().is_empty());
        assert!(!c.should_ignore("anything"));
    }

    #[test]
    fn extend_keeps_defaults() {
        let c = IgnoreClassifier::default().extend(vec!["Custom notice".to_string()]);
        assert!(c.should_ignore("Custom notice: hi"));
        assert!(c.should_ignore("Parola:1"));
    }
}
