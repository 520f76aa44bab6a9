/// Constants used by flag derivation.
pub mod flags {
    /// Strength labels that do not count as expression.
    pub const NOT_EXPRESSED_STRENGTHS: [&str; 2] = ["Absent", "Not Applicable"];
    /// Every strength label known to the GXD strength vocabulary.
    pub const KNOWN_STRENGTHS: [&str; 9] = [
        "Absent",
        "Not Applicable",
        "Present",
        "Ambiguous",
        "Trace",
        "Weak",
        "Moderate",
        "Strong",
        "Very Strong",
    ];
    /// Assay types that only report recombinase activity (not shown in GXD).
    pub const RECOMBINASE_ASSAY_TYPES: [i64; 2] = [10, 11];
    /// In situ reporter (knock in) assay type.
    pub const REPORTER_ASSAY_TYPE: i64 = 9;
    /// Reporter gene names treated as recombinase drivers by the reporter-gene rule.
    pub const RECOMBINASE_REPORTER_GENES: [&str; 2] = ["Cre", "FLP"];
    /// Separator used when joining distinct strength labels for display.
    pub const STRENGTH_LABEL_SEPARATOR: &str = ", ";
}

/// Constants used by the cache record builder.
pub mod builder {
    /// Value written for a missing age-min/age-max during a full reload.
    pub const AGE_SENTINEL: f64 = -1.0;
    /// Note escapes applied in order; backslash must come first.
    pub const NOTE_ESCAPES: [(&str, &str); 7] = [
        ("\\", "\\\\"),
        ("#", "\\#"),
        ("?", "\\?"),
        ("\r", "\\r"),
        ("\n", "\\n"),
        ("|", "\\|"),
        ("'s", "''s"),
    ];
}

/// Constants used by the batch coordinator and update paths.
pub mod reload {
    /// Assays per full-reload batch.
    pub const DEFAULT_BATCH_SIZE: i64 = 1000;
    /// First identifier assigned by a from-scratch full reload.
    pub const FIRST_EXPRESSION_KEY: i64 = 1;
}

/// Constants used by BCP and SQL rendering.
pub mod bcp {
    /// Target cache table.
    pub const TABLE: &str = "GXD_Expression";
    /// Default field delimiter.
    pub const COLUMN_DELIMITER: &str = "|";
    /// Default record delimiter.
    pub const LINE_DELIMITER: &str = "\n";
    /// Field delimiter used by the legacy scripts.
    pub const LEGACY_COLUMN_DELIMITER: &str = "\t";
    /// Characters a delimiter may not use: the escape character and anything
    /// that can appear in a numeric column.
    pub const RESERVED_DELIMITER_CHARS: &str = "\\-+.";
    /// Default BCP output file name.
    pub const DEFAULT_BCP_FILENAME: &str = "GXD_Expression.bcp";
    /// Environment variable naming the BCP output directory.
    pub const BCP_DIR_ENV: &str = "MGICACHEBCPDIR";
    /// Column order of a cache row, identifier first.
    pub const COLUMNS: [&str; 20] = [
        "_expression_key",
        "_assay_key",
        "_refs_key",
        "_assaytype_key",
        "_genotype_key",
        "_marker_key",
        "_structure_key",
        "_emaps_key",
        "_stage_key",
        "_specimen_key",
        "_gellane_key",
        "expressed",
        "strength",
        "age",
        "agemin",
        "agemax",
        "isrecombinase",
        "isforgxd",
        "hasimage",
        "resultnote",
    ];
    /// Free-text columns: quoted in SQL statements, escaped in BCP records.
    pub const TEXT_COLUMNS: [&str; 3] = ["strength", "age", "resultnote"];
}

/// Constants used by filesystem dumps of source rows.
pub mod dumps {
    /// JSON-lines dump of in situ (specimen-based) result rows.
    pub const INSITU_DUMP_FILENAME: &str = "insitu.jsonl";
    /// JSON-lines dump of gel (gel-lane-based) result rows.
    pub const GEL_DUMP_FILENAME: &str = "gel.jsonl";
}
