//! Unit tests for the Identifiers module

use core_kernel::{
    BankConnectionId, BankTransactionId, CompanyId, EventId, JournalEntryId, JournalLineId,
};
use uuid::Uuid;

mod company_id_tests {
    use super::*;

    #[test]
    fn test_new_generates_unique_ids() {
        let id1 = CompanyId::new();
        let id2 = CompanyId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_from_uuid() {
        let uuid = Uuid::new_v4();
        let id = CompanyId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
    }

    #[test]
    fn test_from_str_with_prefix() {
        let original = CompanyId::new();
        let parsed: CompanyId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_from_str_without_prefix() {
        let uuid = Uuid::new_v4();
        let parsed: CompanyId = uuid.to_string().parse().unwrap();
        assert_eq!(*parsed.as_uuid(), uuid);
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        assert!("CMP-not-a-uuid".parse::<CompanyId>().is_err());
    }
}

mod event_id_tests {
    use super::*;

    #[test]
    fn test_new_v7_generates_time_ordered_ids() {
        let id1 = EventId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = EventId::new_v7();
        assert!(id1 < id2);
    }
}

mod prefixes {
    use super::*;

    #[test]
    fn test_prefixes_are_distinct() {
        let prefixes = [
            CompanyId::prefix(),
            EventId::prefix(),
            JournalEntryId::prefix(),
            JournalLineId::prefix(),
            BankConnectionId::prefix(),
            BankTransactionId::prefix(),
        ];
        let mut sorted = prefixes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), prefixes.len());
    }

    #[test]
    fn test_journal_line_prefix_does_not_parse_as_entry_prefix() {
        let line = JournalLineId::new();
        let display = line.to_string();
        assert!(display.starts_with("JNLL-"));
        assert!(display.parse::<JournalEntryId>().is_err());
    }
}
