//! Customer-facing message templates (Bahasa Indonesia).

pub const IMAGE_PLACEHOLDER: &str = "[Dikirim Gambar]";
pub const DOCUMENT_PLACEHOLDER: &str = "[Dikirim Dokumen]";

pub const APOLOGY: &str = "Maaf, sistem AI sedang sibuk. Silakan coba sesaat lagi.";

pub const FOLLOW_UP_QUESTION: &str = "\n\nApakah ada yang bisa saya bantu lagi?";

pub const LOW_RATING_FEEDBACK_REQUEST: &str = "Mohon maaf jika pelayanan kami belum maksimal. 🙏\n\nBolehkah Anda memberi masukan singkat mengenai apa yang perlu kami perbaiki?";

pub const FEEDBACK_ACK: &str = "Terima kasih atas masukannya. Kami akan menjadikan ini bahan evaluasi untuk meningkatkan kecerdasan AI kami. 🙏";

/// Fallback salutation when neither a push name nor an introduction is known.
pub const DEFAULT_CONTACT: &str = "Kak";

pub fn welcome(contact: &str) -> String {
    format!(
        "Halo Kak *{}*! 👋\n\nSaya *PPID Assistant*, konsultan virtual cerdas dari BRIDA Provinsi Jawa Tengah.\n\nSaya siap membantu menjawab pertanyaan Anda seputar layanan publik, riset, dan inovasi daerah.\n\n_Ada yang bisa saya bantu?_",
        contact
    )
}

pub fn handover_holding(contact: &str) -> String {
    format!(
        "Baik Kak *{}*, saya akan menghubungkan Anda dengan petugas kami. 🙏\n\nMohon tunggu sebentar ya, petugas akan segera merespons.\n\n_Terima kasih atas kesabarannya._",
        contact
    )
}

pub fn survey_prompt(name: &str) -> String {
    format!(
        "Terima kasih telah menghubungi PPID BRIDA Jawa Tengah, {} 🙏\n\nMohon nilai pelayanan kami (ketik angka 1-5):\n\n⭐ 1 = Sangat Kecewa\n⭐⭐ 2 = Kurang Puas\n⭐⭐⭐ 3 = Cukup\n⭐⭐⭐⭐ 4 = Puas\n⭐⭐⭐⭐⭐ 5 = Sangat Puas\n\n_Ketik angka saja (misal: 5)_",
        name
    )
}

pub fn inactivity_survey(name: Option<&str>) -> String {
    format!(
        "Halo {}, sepertinya Anda sedang sibuk. Terima kasih telah menghubungi PPID BRIDA Jawa Tengah.\n\nMohon berikan penilaian Anda (1-5):\n\n1 = Sangat Kecewa\n5 = Sangat Puas",
        name.unwrap_or("Bapak/Ibu")
    )
}

pub fn rating_thanks(rating: i32) -> String {
    format!(
        "Terima kasih atas penilaian Anda ({}/5). Semoga sehat selalu! 👋",
        rating
    )
}
