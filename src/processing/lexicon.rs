//! Word lists used by article analysis

/// Categories in tie-break order, each with the terms that signal it
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "politics",
        &[
            "government", "election", "president", "minister", "parliament", "policy", "senate",
            "congress", "vote", "政府", "选举", "总统", "政策", "部长", "人大", "政治",
        ],
    ),
    (
        "economy",
        &[
            "economy", "economic", "market", "markets", "stock", "stocks", "inflation", "trade",
            "bank", "gdp", "investment", "经济", "市场", "股市", "通胀", "贸易", "银行", "投资",
        ],
    ),
    (
        "technology",
        &[
            "technology", "tech", "software", "chip", "chips", "ai", "internet", "smartphone",
            "startup", "robot", "科技", "技术", "芯片", "人工智能", "互联网", "手机",
        ],
    ),
    (
        "sports",
        &[
            "football", "soccer", "basketball", "match", "tournament", "olympic", "olympics",
            "league", "championship", "coach", "体育", "足球", "篮球", "比赛", "奥运", "冠军",
        ],
    ),
    (
        "entertainment",
        &[
            "film", "movie", "music", "celebrity", "concert", "actor", "actress", "festival",
            "album", "娱乐", "电影", "音乐", "明星", "演唱会",
        ],
    ),
    (
        "health",
        &[
            "health", "hospital", "disease", "vaccine", "medical", "doctor", "virus", "patients",
            "健康", "医院", "疾病", "疫苗", "医疗", "医生",
        ],
    ),
    (
        "education",
        &[
            "school", "schools", "university", "student", "students", "education", "teacher",
            "exam", "教育", "学校", "大学", "学生", "考试", "高考",
        ],
    ),
    (
        "international",
        &[
            "international", "foreign", "diplomatic", "summit", "global", "embassy", "treaty",
            "国际", "外交", "联合国", "峰会", "全球",
        ],
    ),
];

/// Category assigned when no lexicon term occurs
pub const OTHER_CATEGORY: &str = "other";

pub const POSITIVE_TERMS: &[&str] = &[
    "good", "great", "growth", "success", "successful", "win", "wins", "improve", "improved",
    "rise", "rises", "rally", "gain", "gains", "strong", "positive", "record", "boost", "增长",
    "成功", "胜利", "提升", "上涨", "利好", "突破", "改善",
];

pub const NEGATIVE_TERMS: &[&str] = &[
    "bad", "crisis", "decline", "loss", "losses", "fall", "falls", "drop", "weak", "negative",
    "war", "death", "killed", "fraud", "crash", "下跌", "危机", "损失", "失败", "事故", "死亡",
    "下降", "暴跌",
];

/// Words never reported as keywords
pub const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "his", "how", "its", "may", "new", "now", "see", "two", "who",
    "did", "get", "him", "let", "say", "she", "too", "use", "that", "with", "have", "this",
    "will", "your", "from", "they", "been", "more", "were", "said", "than", "them", "then",
    "there", "their", "what", "when", "which", "would", "about", "after", "into", "over",
    "also", "just", "like", "some", "such", "only", "other", "these", "those", "while",
    "where", "being", "could", "should", "today", "我们", "他们", "这个", "一个", "没有",
];
