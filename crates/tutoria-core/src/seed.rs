//! Default dataset inserted into empty collections on first start.

use chrono::Utc;

use crate::sector::Sector;
use crate::tutorial::Tutorial;
use crate::user::{Role, User, hash_password};

/// Password given to every seeded account.
pub const DEFAULT_PASSWORD: &str = "123456";

pub fn default_sectors() -> Vec<Sector> {
    vec![
        Sector::new("1", "Produção"),
        Sector::new("2", "Qualidade"),
        Sector::new("3", "Limpeza"),
        Sector::new("4", "Expedição"),
    ]
}

pub fn default_users() -> Vec<User> {
    let account = |id: &str, name: &str, email: &str, role: Role, sector: Option<&str>| User {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password: hash_password(DEFAULT_PASSWORD),
        role,
        sector_id: sector.map(str::to_string),
        viewed_tutorials: Vec::new(),
    };
    vec![
        account("admin", "Administrador", "admin@empresa.com", Role::Admin, None),
        account("user1", "João Silva", "joao@empresa.com", Role::User, Some("1")),
        account("user2", "Maria Santos", "maria@empresa.com", Role::User, Some("2")),
    ]
}

pub fn default_tutorials() -> Vec<Tutorial> {
    let now = Utc::now();
    vec![
        Tutorial {
            id: "t1".to_string(),
            title: "Uso correto de EPIs".to_string(),
            description: "Sempre utilize luvas e óculos de proteção antes de iniciar a operação."
                .to_string(),
            images: vec![
                "https://images.unsplash.com/photo-1504307651254-35680f356dfd?w=400".to_string(),
            ],
            audio_url: None,
            sector_id: "1".to_string(),
            created_by: "admin".to_string(),
            created_at: now,
        },
        Tutorial {
            id: "t2".to_string(),
            title: "Limpeza de equipamentos".to_string(),
            description: "Limpe os equipamentos ao final de cada turno conforme procedimento."
                .to_string(),
            images: vec![
                "https://images.unsplash.com/photo-1581578731548-c64695cc6952?w=400".to_string(),
            ],
            audio_url: None,
            sector_id: "3".to_string(),
            created_by: "admin".to_string(),
            created_at: now,
        },
    ]
}
